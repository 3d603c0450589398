// lofront_core/src/buffer.rs

//! Bounded, time-keyed storage for one sensor modality.
//!
//! One generic [`MeasurementBuffer`] serves the inertial, odometry and
//! external-pose streams. Samples are kept sorted by timestamp; when the cap is
//! exceeded the oldest sample *by time* is dropped.

use crate::messages::{OdometrySample, PoseStampedSample, Stamped};
use crate::types::Timestamp;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct MeasurementBuffer<T> {
    samples: VecDeque<T>,
    size_limit: usize,
}

impl<T: Stamped> MeasurementBuffer<T> {
    /// `size_limit` is clamped to at least one sample.
    pub fn new(size_limit: usize) -> Self {
        let size_limit = size_limit.max(1);
        Self {
            samples: VecDeque::with_capacity(size_limit + 1),
            size_limit,
        }
    }

    /// Stores `sample` at its timestamp, overwriting an existing sample with the
    /// same timestamp.
    ///
    /// The insert itself never fails. Returns `false` when the cap was exceeded
    /// and the oldest sample had to be evicted to make room.
    pub fn insert(&mut self, sample: T) -> bool {
        let stamp = sample.timestamp();
        // Fast path: callbacks usually arrive in order.
        let idx = match self.samples.back() {
            Some(last) if last.timestamp() < stamp => self.samples.len(),
            _ => self
                .samples
                .partition_point(|s| s.timestamp().total_cmp(&stamp).is_lt()),
        };

        if let Some(existing) = self.samples.get_mut(idx) {
            if existing.timestamp().total_cmp(&stamp).is_eq() {
                *existing = sample;
                return true;
            }
        }
        self.samples.insert(idx, sample);

        if self.samples.len() > self.size_limit {
            self.samples.pop_front();
            return false;
        }
        true
    }

    /// The buffered sample closest in time to `stamp`. Ties go to the older one.
    pub fn query_nearest(&self, stamp: Timestamp) -> Option<&T> {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp().total_cmp(&stamp).is_lt());
        let after = self.samples.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));

        match (before, after) {
            (Some(b), Some(a)) => {
                if (stamp - b.timestamp()).abs() <= (a.timestamp() - stamp).abs() {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    /// The two samples bracketing `stamp` (`before.t <= stamp <= after.t`), if any.
    pub fn query_bracket(&self, stamp: Timestamp) -> Option<(&T, &T)> {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp().total_cmp(&stamp).is_lt());
        let after = self.samples.get(idx)?;
        if after.timestamp() == stamp {
            return Some((after, after));
        }
        let before = self.samples.get(idx.checked_sub(1)?)?;
        Some((before, after))
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.samples.front().map(Stamped::timestamp)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }
}

impl<T: Stamped + Interpolate + Clone> MeasurementBuffer<T> {
    /// Blends the two samples bracketing `stamp`. Outside the buffered range
    /// this degrades to [`MeasurementBuffer::query_nearest`].
    pub fn query_interpolated(&self, stamp: Timestamp) -> Option<T> {
        match self.query_bracket(stamp) {
            Some((before, after)) => {
                let span = after.timestamp() - before.timestamp();
                if span <= 0.0 {
                    return Some(before.clone());
                }
                let ratio = (stamp - before.timestamp()) / span;
                Some(before.interpolate(after, ratio, stamp))
            }
            None => self.query_nearest(stamp).cloned(),
        }
    }
}

// =========================================================================
// == Interpolation ==
// =========================================================================

/// Blending of two samples of the same stream.
pub trait Interpolate {
    /// `ratio` in `[0, 1]`: 0 returns `self`, 1 returns `other`. The result is
    /// stamped with `stamp`.
    fn interpolate(&self, other: &Self, ratio: f64, stamp: Timestamp) -> Self;
}

impl Interpolate for OdometrySample {
    fn interpolate(&self, other: &Self, ratio: f64, stamp: Timestamp) -> Self {
        Self {
            frame_id: self.frame_id.clone(),
            child_frame_id: self.child_frame_id.clone(),
            timestamp: stamp,
            pose: self.pose.lerp_slerp(&other.pose, ratio),
        }
    }
}

impl Interpolate for PoseStampedSample {
    fn interpolate(&self, other: &Self, ratio: f64, stamp: Timestamp) -> Self {
        Self {
            frame_id: self.frame_id.clone(),
            timestamp: stamp,
            pose: self.pose.lerp_slerp(&other.pose, ratio),
        }
    }
}

// =========================================================================
// == Shared Handle ==
// =========================================================================

/// A buffer that a sensor callback thread can write while the pipeline reads.
///
/// Each modality gets its own lock; there is no lock across modalities.
#[derive(Debug)]
pub struct SharedBuffer<T> {
    inner: Arc<Mutex<MeasurementBuffer<T>>>,
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Stamped> SharedBuffer<T> {
    pub fn new(size_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MeasurementBuffer::new(size_limit))),
        }
    }

    /// See [`MeasurementBuffer::insert`].
    pub fn insert(&self, sample: T) -> bool {
        self.lock().insert(sample)
    }

    /// Locks the buffer. A writer that panicked mid-insert cannot leave the
    /// deque in a broken state, so a poisoned lock is simply recovered.
    pub fn lock(&self) -> MutexGuard<'_, MeasurementBuffer<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
