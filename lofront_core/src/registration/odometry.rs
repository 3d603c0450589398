// lofront_core/src/registration/odometry.rs

use log::{debug, warn};
use nalgebra::Translation3;

use super::{FlatGroundFlag, PointToPointIcp, ScanRegistration};
use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::estimation::attitude::yaw_twist;
use crate::messages::PointCloud;
use crate::types::Pose3;

/// What a successful [`PointCloudOdometry::update_estimate`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegistrationStatus {
    /// First scan: it became the reference, estimates stay at identity.
    Initialized,
    /// The alignment was accepted and composed into the integrated estimate.
    Accepted,
    /// The alignment exceeded the motion bounds; incremental forced to identity.
    Rejected { translation: f64, rotation: f64 },
}

/// Scan-to-scan LiDAR odometry.
///
/// Each cycle the newest scan (query) is aligned against the previous one
/// (reference), the result is gated against motion bounds, and the accepted
/// increment is composed into the integrated estimate:
/// `integrated(t) = integrated(t-1) ∘ incremental(t)`.
#[derive(Debug)]
pub struct PointCloudOdometry {
    config: RegistrationConfig,
    registration: Box<dyn ScanRegistration>,
    flat_ground: FlatGroundFlag,

    query: Option<PointCloud>,
    reference: Option<PointCloud>,
    initial_guess: Pose3,

    incremental_estimate: Pose3,
    integrated_estimate: Pose3,
    fitness_score: f64,
    aligned: PointCloud,
}

impl PointCloudOdometry {
    /// An engine backed by point-to-point ICP.
    pub fn new(config: RegistrationConfig, flat_ground: FlatGroundFlag) -> Self {
        let icp = PointToPointIcp::new(config.clone().into());
        Self::with_registration(config, Box::new(icp), flat_ground)
    }

    pub fn with_registration(
        config: RegistrationConfig,
        registration: Box<dyn ScanRegistration>,
        flat_ground: FlatGroundFlag,
    ) -> Self {
        Self {
            config,
            registration,
            flat_ground,
            query: None,
            reference: None,
            initial_guess: Pose3::identity(),
            incremental_estimate: Pose3::identity(),
            integrated_estimate: Pose3::identity(),
            fitness_score: 0.0,
            aligned: PointCloud::default(),
        }
    }

    /// Queues the scan for the next [`PointCloudOdometry::update_estimate`].
    pub fn set_lidar(&mut self, points: PointCloud) {
        self.query = Some(points);
    }

    /// The initial guess for the next alignment. `None` means identity.
    pub fn set_prior(&mut self, prior: Option<Pose3>) {
        self.initial_guess = prior.unwrap_or_else(Pose3::identity);
    }

    /// Runs one registration cycle on the queued scan.
    ///
    /// On `Err` the integrated estimate is untouched and the incremental
    /// estimate is identity. An empty scan never becomes the reference; any
    /// other failed scan does, so the next cycle registers against fresh data.
    pub fn update_estimate(&mut self) -> Result<RegistrationStatus, RegistrationError> {
        let guess = std::mem::replace(&mut self.initial_guess, Pose3::identity());
        self.incremental_estimate = Pose3::identity();

        let query = self.query.take().ok_or(RegistrationError::EmptyQuery)?;
        if query.is_empty() {
            return Err(RegistrationError::EmptyQuery);
        }

        let Some(reference) = self.reference.as_ref() else {
            debug!("Odometry initialized with {} points", query.len());
            self.aligned = query.clone();
            self.reference = Some(query);
            return Ok(RegistrationStatus::Initialized);
        };

        let result = self.registration.align(&query, reference, &guess);
        let alignment = match result {
            Ok(alignment) => alignment,
            Err(err) => {
                warn!("Scan-to-scan registration failed: {}", err);
                self.reference = Some(query);
                return Err(err);
            }
        };
        self.fitness_score = alignment.fitness_score;

        let mut increment = alignment.transform;
        if self.flat_ground.get() {
            increment = constrain_to_ground(&increment);
        }

        let translation = increment.translation.vector.norm();
        let rotation = increment.rotation.angle();
        if self.config.transform_thresholding
            && (translation > self.config.max_translation || rotation > self.config.max_rotation)
        {
            warn!(
                "Rejecting scan-to-scan increment ({:.3} m, {:.3} rad) beyond ({:.3} m, {:.3} rad)",
                translation, rotation, self.config.max_translation, self.config.max_rotation
            );
            // Reported through the identity increment, like the estimate.
            self.aligned = query.clone();
            self.reference = Some(query);
            return Ok(RegistrationStatus::Rejected {
                translation,
                rotation,
            });
        }

        self.aligned = query.transformed(&increment);
        self.reference = Some(query);
        self.incremental_estimate = increment;
        self.integrated_estimate *= increment;
        debug!(
            "Registered in {} iterations, fitness {:.6}",
            alignment.iterations, alignment.fitness_score
        );
        Ok(RegistrationStatus::Accepted)
    }

    pub fn incremental_estimate(&self) -> &Pose3 {
        &self.incremental_estimate
    }

    pub fn integrated_estimate(&self) -> &Pose3 {
        &self.integrated_estimate
    }

    /// Mean squared correspondence distance of the last alignment.
    pub fn fitness_score(&self) -> f64 {
        self.fitness_score
    }

    /// The last query scan, mapped into its reference's frame.
    pub fn aligned_points(&self) -> &PointCloud {
        &self.aligned
    }

    /// The scan the next query will be aligned against.
    pub fn last_point_cloud(&self) -> Option<&PointCloud> {
        self.reference.as_ref()
    }
}

/// Drops vertical translation and roll/pitch, keeping heading.
fn constrain_to_ground(pose: &Pose3) -> Pose3 {
    let t = pose.translation.vector;
    Pose3::from_parts(Translation3::new(t.x, t.y, 0.0), yaw_twist(&pose.rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Point;
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_cloud(n: usize, seed: u64) -> PointCloud {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let points = (0..n)
            .map(|_| {
                Point::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-3.0..3.0),
                )
            })
            .collect();
        PointCloud::new("lidar", 0.0, points)
    }

    fn config(thresholding: bool, max_translation: f64) -> RegistrationConfig {
        RegistrationConfig {
            tf_epsilon: 1e-10,
            corr_dist: 1.0,
            iterations: 30,
            transform_thresholding: thresholding,
            max_translation,
            ..RegistrationConfig::default()
        }
    }

    /// Feeds `first`, then `first` seen from a sensor moved by `motion`.
    fn run_pair(
        engine: &mut PointCloudOdometry,
        first: &PointCloud,
        motion: &Pose3,
    ) -> RegistrationStatus {
        engine.set_lidar(first.clone());
        assert_eq!(engine.update_estimate(), Ok(RegistrationStatus::Initialized));
        engine.set_lidar(first.transformed(&motion.inverse()));
        engine.update_estimate().unwrap()
    }

    #[test]
    fn same_scan_twice_gives_identity() {
        let mut engine = PointCloudOdometry::new(config(true, 0.5), FlatGroundFlag::default());
        let cloud = random_cloud(300, 1);
        let status = run_pair(&mut engine, &cloud, &Pose3::identity());

        assert_eq!(status, RegistrationStatus::Accepted);
        assert_abs_diff_eq!(
            engine.incremental_estimate().translation.vector.norm(),
            0.0,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(engine.incremental_estimate().rotation.angle(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn accepted_increment_composes_into_integrated() {
        let mut engine = PointCloudOdometry::new(config(true, 1.0), FlatGroundFlag::default());
        let cloud = random_cloud(300, 2);
        let motion = Pose3::translation(0.3, 0.0, 0.0);

        assert_eq!(run_pair(&mut engine, &cloud, &motion), RegistrationStatus::Accepted);
        assert_abs_diff_eq!(engine.incremental_estimate().translation.x, 0.3, epsilon = 1e-6);

        // Another identical step: integrated = previous ∘ incremental.
        let before = *engine.integrated_estimate();
        let second = cloud.transformed(&(motion * motion).inverse());
        engine.set_lidar(second);
        assert_eq!(engine.update_estimate(), Ok(RegistrationStatus::Accepted));
        let expected = before * engine.incremental_estimate();
        assert_abs_diff_eq!(
            (engine.integrated_estimate().inverse() * expected).translation.vector.norm(),
            0.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(engine.integrated_estimate().translation.x, 0.6, epsilon = 1e-5);
    }

    #[test]
    fn motion_beyond_bounds_is_rejected() {
        let mut engine = PointCloudOdometry::new(config(true, 0.1), FlatGroundFlag::default());
        let cloud = random_cloud(300, 3);
        let small = Pose3::translation(0.05, 0.0, 0.0);
        assert_eq!(run_pair(&mut engine, &cloud, &small), RegistrationStatus::Accepted);
        let before = *engine.integrated_estimate();
        assert_abs_diff_eq!(before.translation.x, 0.05, epsilon = 1e-6);

        // Then a step three times the bound.
        let second = cloud.transformed(&(small * Pose3::translation(0.3, 0.0, 0.0)).inverse());
        engine.set_lidar(second.clone());
        let status = engine.update_estimate().unwrap();

        assert!(matches!(
            status,
            RegistrationStatus::Rejected { translation, .. } if translation > 0.1
        ));
        assert_eq!(*engine.incremental_estimate(), Pose3::identity());
        assert_eq!(*engine.integrated_estimate(), before);

        // The aligned cloud agrees with the identity increment.
        let aligned = engine.aligned_points();
        assert_eq!(aligned.len(), second.len());
        for (a, q) in aligned.points.iter().zip(&second.points) {
            assert_eq!(a.position, q.position);
        }
    }

    #[test]
    fn thresholds_ignored_when_disabled() {
        let mut engine = PointCloudOdometry::new(config(false, 0.1), FlatGroundFlag::default());
        let cloud = random_cloud(300, 3);
        let status = run_pair(&mut engine, &cloud, &Pose3::translation(0.3, 0.0, 0.0));
        assert_eq!(status, RegistrationStatus::Accepted);
    }

    #[test]
    fn empty_scan_is_a_soft_failure() {
        let mut engine = PointCloudOdometry::new(config(false, 1.0), FlatGroundFlag::default());
        let cloud = random_cloud(100, 4);
        engine.set_lidar(cloud);
        engine.update_estimate().unwrap();

        engine.set_lidar(PointCloud::default());
        assert_eq!(engine.update_estimate(), Err(RegistrationError::EmptyQuery));
        assert_eq!(*engine.incremental_estimate(), Pose3::identity());
        // The empty scan did not replace the reference.
        assert_eq!(engine.last_point_cloud().map(PointCloud::len), Some(100));

        // Nothing queued at all.
        assert_eq!(engine.update_estimate(), Err(RegistrationError::EmptyQuery));
    }

    #[test]
    fn flat_ground_removes_vertical_motion() {
        let flag = FlatGroundFlag::new(false);
        let mut engine = PointCloudOdometry::new(config(false, 1.0), flag.clone());
        flag.set(true);

        let cloud = random_cloud(300, 6);
        let motion = Pose3::from_parts(
            Translation3::new(0.2, 0.0, 0.1),
            UnitQuaternion::from_euler_angles(0.02, 0.0, 0.05),
        );
        run_pair(&mut engine, &cloud, &motion);

        let increment = engine.incremental_estimate();
        let (roll, pitch, yaw) = increment.rotation.euler_angles();
        assert_abs_diff_eq!(increment.translation.z, 0.0);
        assert_abs_diff_eq!(roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pitch, 0.0, epsilon = 1e-12);
        assert!(yaw > 0.0);
    }
}
