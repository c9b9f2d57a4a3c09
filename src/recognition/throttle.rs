//! Recognition throttling
//!
//! Detection runs on every frame, but identification is the dominant cost.
//! A pass is run on every Nth frame, or whenever the number of detected
//! faces differs from the previous frame; in between, the last identities
//! are reused for the same number of faces.

use super::Identity;

/// Default number of frames between forced identification passes
pub const DEFAULT_RECOGNITION_INTERVAL: u32 = 10;

/// Decides when to re-run identification for one session
#[derive(Debug, Clone)]
pub struct RecognitionThrottle {
    interval: u32,
    frames_seen: u64,
    prev_face_count: usize,
    identities: Vec<Identity>,
}

impl RecognitionThrottle {
    /// Create a throttle forcing a pass every `interval` frames (minimum 1)
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            frames_seen: 0,
            prev_face_count: 0,
            identities: Vec::new(),
        }
    }

    /// Record a new frame's face count and report whether a pass is due
    pub fn observe(&mut self, face_count: usize) -> bool {
        let due =
            self.frames_seen % self.interval as u64 == 0 || face_count != self.prev_face_count;
        self.prev_face_count = face_count;
        self.frames_seen += 1;
        due
    }

    /// Store the identities from a completed pass
    pub fn record(&mut self, identities: Vec<Identity>) {
        self.identities = identities;
    }

    /// Identities to draw for `face_count` faces
    ///
    /// Reuses the last pass when it covers every face, otherwise labels all
    /// of them unknown.
    pub fn identities_for(&self, face_count: usize) -> Vec<Identity> {
        if self.identities.len() >= face_count {
            self.identities[..face_count].to_vec()
        } else {
            vec![Identity::Unknown; face_count]
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }
}

impl Default for RecognitionThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_RECOGNITION_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_due() {
        let mut throttle = RecognitionThrottle::new(10);
        assert!(throttle.observe(0));
    }

    #[test]
    fn test_every_nth_frame() {
        let mut throttle = RecognitionThrottle::new(3);
        let due: Vec<bool> = (0..7).map(|_| throttle.observe(1)).collect();
        // Frame 0 is due twice over (interval and count change from 0 to 1)
        assert_eq!(due, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_face_count_change_forces_pass() {
        let mut throttle = RecognitionThrottle::new(100);
        assert!(throttle.observe(1));
        assert!(!throttle.observe(1));
        assert!(throttle.observe(2));
        assert!(!throttle.observe(2));
        assert!(throttle.observe(0));
    }

    #[test]
    fn test_identities_reused() {
        let mut throttle = RecognitionThrottle::new(10);
        throttle.record(vec![Identity::Known("alice".into()), Identity::Unknown]);

        assert_eq!(
            throttle.identities_for(1),
            vec![Identity::Known("alice".into())]
        );
        assert_eq!(throttle.identities_for(2).len(), 2);
    }

    #[test]
    fn test_insufficient_identities_fall_back_to_unknown() {
        let mut throttle = RecognitionThrottle::new(10);
        throttle.record(vec![Identity::Known("alice".into())]);

        assert_eq!(
            throttle.identities_for(3),
            vec![Identity::Unknown, Identity::Unknown, Identity::Unknown]
        );
    }

    #[test]
    fn test_zero_interval_clamped() {
        let throttle = RecognitionThrottle::new(0);
        assert_eq!(throttle.interval(), 1);
    }
}
