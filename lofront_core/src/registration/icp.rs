// lofront_core/src/registration/icp.rs

//! Point-to-point Iterative Closest Point in 3D.
//!
//! ```text
//! Input: query Q, reference R, initial guess T₀
//! 1. Build a k-d tree over R
//! 2. Repeat until converged or max_iterations:
//!    a. Pair every T·q with its nearest r, dropping pairs beyond corr_dist
//!    b. Solve the best rigid ΔT for the pairs (SVD / Kabsch)
//!    c. T = ΔT · T
//!    d. Converged once |Δt|² + |Δθ|² < epsilon
//! ```

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use super::{Alignment, ScanRegistration};
use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::messages::PointCloud;
use crate::types::Pose3;

/// Fewer pairs than this cannot constrain a 3D rigid transform.
const MIN_PAIRS_FOR_SOLVE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct IcpConfig {
    /// Convergence bound on `|Δt|² + |Δθ|²` of one iteration's update.
    pub epsilon: f64,
    /// Pairs farther apart than this (meters) are rejected as outliers.
    pub max_correspondence_distance: f64,
    pub max_iterations: u32,
    pub min_correspondences: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        RegistrationConfig::default().into()
    }
}

impl From<RegistrationConfig> for IcpConfig {
    fn from(config: RegistrationConfig) -> Self {
        Self {
            epsilon: config.tf_epsilon,
            max_correspondence_distance: config.corr_dist,
            max_iterations: config.iterations,
            min_correspondences: config.min_correspondences,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointToPointIcp {
    config: IcpConfig,
}

impl PointToPointIcp {
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Pairs each transformed query point with its nearest reference point.
    fn find_correspondences(
        &self,
        query: &PointCloud,
        reference: &PointCloud,
        tree: &ImmutableKdTree<f64, 3>,
        transform: &Pose3,
    ) -> Vec<(Point3<f64>, Point3<f64>, f64)> {
        let max_dist_sq = self.config.max_correspondence_distance.powi(2);
        query
            .points
            .iter()
            .filter_map(|p| {
                let moved = transform * p.position;
                let nearest = tree.nearest_one::<SquaredEuclidean>(&[moved.x, moved.y, moved.z]);
                (nearest.distance <= max_dist_sq).then(|| {
                    let target = reference.points[nearest.item as usize].position;
                    (moved, target, nearest.distance)
                })
            })
            .collect()
    }
}

/// Best rigid transform mapping `pairs.0` onto `pairs.1` in the least-squares sense.
fn solve_rigid(pairs: &[(Point3<f64>, Point3<f64>, f64)]) -> Option<Pose3> {
    let n = pairs.len() as f64;
    let (sum_src, sum_dst) = pairs.iter().fold(
        (Vector3::zeros(), Vector3::zeros()),
        |(s, d), (src, dst, _)| (s + src.coords, d + dst.coords),
    );
    let centroid_src = sum_src / n;
    let centroid_dst = sum_dst / n;

    // H = Σ (src_i - c_src)(dst_i - c_dst)ᵀ
    let h: Matrix3<f64> = pairs.iter().fold(Matrix3::zeros(), |acc, (src, dst, _)| {
        acc + (src.coords - centroid_src) * (dst.coords - centroid_dst).transpose()
    });

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut correction = Matrix3::identity();
    if (v_t.transpose() * u.transpose()).determinant() < 0.0 {
        // Reflection, not a rotation: flip the weakest axis.
        correction[(2, 2)] = -1.0;
    }
    let r = v_t.transpose() * correction * u.transpose();
    if !r.iter().all(|v| v.is_finite()) {
        return None;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let translation = centroid_dst - rotation * centroid_src;
    Some(Pose3::from_parts(Translation3::from(translation), rotation))
}

impl ScanRegistration for PointToPointIcp {
    fn align(
        &self,
        query: &PointCloud,
        reference: &PointCloud,
        initial_guess: &Pose3,
    ) -> Result<Alignment, RegistrationError> {
        if query.is_empty() {
            return Err(RegistrationError::EmptyQuery);
        }
        if reference.is_empty() {
            return Err(RegistrationError::EmptyReference);
        }

        let required = self.config.min_correspondences.max(MIN_PAIRS_FOR_SOLVE);
        let positions: Vec<[f64; 3]> = reference
            .points
            .iter()
            .map(|p| [p.position.x, p.position.y, p.position.z])
            .collect();
        let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&positions);

        let mut transform = *initial_guess;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let pairs = self.find_correspondences(query, reference, &tree, &transform);
            if pairs.len() < required {
                return Err(RegistrationError::InsufficientCorrespondences {
                    found: pairs.len(),
                    required,
                });
            }

            let delta = solve_rigid(&pairs).ok_or(RegistrationError::Degenerate)?;
            transform = delta * transform;

            let change =
                delta.translation.vector.norm_squared() + delta.rotation.angle().powi(2);
            if change < self.config.epsilon {
                converged = true;
                break;
            }
        }

        let pairs = self.find_correspondences(query, reference, &tree, &transform);
        let fitness_score = if pairs.is_empty() {
            f64::MAX
        } else {
            pairs.iter().map(|(_, _, d)| d).sum::<f64>() / pairs.len() as f64
        };

        Ok(Alignment {
            transform,
            fitness_score,
            iterations,
            converged,
        })
    }
}
