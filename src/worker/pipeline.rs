//! Per-frame processing
//!
//! Runs on the blocking pool: detect, identify when the throttle asks for
//! it, then draw the overlay. Collaborator failures degrade the result
//! (no regions, or everyone unknown) but never fail the frame.

use crate::media::{annotate, short_id, Frame};
use crate::recognition::{Detection, FaceMatcher, Identity, RecognitionThrottle};

/// Result of processing one frame
#[derive(Debug)]
pub struct Processed {
    /// The annotated frame
    pub frame: Frame,
    /// Faces found, with the identities drawn for them
    pub detections: Vec<Detection>,
    /// Whether an identification pass ran for this frame
    pub recognition_pass: bool,
}

impl Processed {
    /// Distinct known labels in this frame
    pub fn known_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self
            .detections
            .iter()
            .filter(|d| d.identity.is_known())
            .map(|d| d.identity.label())
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Watermark lines drawn top-left on every processed frame
pub fn watermark(session_id: &str, fps: f64, faces: usize) -> Vec<String> {
    vec![
        short_id(session_id).to_string(),
        format!("FPS: {:.1}", fps),
        format!("FACES: {}", faces),
    ]
}

/// Process one frame in place
pub fn process_frame(
    matcher: &dyn FaceMatcher,
    throttle: &mut RecognitionThrottle,
    mut frame: Frame,
    session_id: &str,
    fps: f64,
) -> Processed {
    let regions = match matcher.detect(&frame.image) {
        Ok(regions) => regions,
        Err(e) => {
            tracing::warn!(session = %session_id, seq = frame.seq, error = %e, "Face detection failed");
            Vec::new()
        }
    };

    let due = throttle.observe(regions.len());
    let recognition_pass = due && !regions.is_empty();

    let identities = if recognition_pass {
        let identities = match matcher.identify(&frame.image, &regions) {
            Ok(mut identities) => {
                identities.resize(regions.len(), Identity::Unknown);
                identities
            }
            Err(e) => {
                tracing::warn!(session = %session_id, seq = frame.seq, error = %e, "Face identification failed");
                vec![Identity::Unknown; regions.len()]
            }
        };
        throttle.record(identities.clone());
        identities
    } else {
        if due {
            throttle.record(Vec::new());
        }
        throttle.identities_for(regions.len())
    };

    let detections: Vec<Detection> = regions
        .into_iter()
        .zip(identities)
        .map(|(region, identity)| Detection::new(region, identity))
        .collect();

    let lines = watermark(session_id, fps, detections.len());
    annotate(&mut frame.image, &detections, &lines);

    Processed {
        frame,
        detections,
        recognition_pass,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use image::RgbImage;

    use super::*;
    use crate::media::overlay::{KNOWN_COLOR, TEXT_COLOR, UNKNOWN_COLOR};
    use crate::recognition::tests::ScriptedMatcher;
    use crate::recognition::{BoundingBox, NullMatcher};

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(160, 120, image::Rgb([30, 30, 30])), 0)
    }

    #[test]
    fn test_zero_faces_only_watermark() {
        let mut throttle = RecognitionThrottle::default();
        let processed = process_frame(&NullMatcher, &mut throttle, frame(), "cam-1", 0.0);

        assert!(processed.detections.is_empty());
        assert!(!processed.recognition_pass);
        let image = &processed.frame.image;
        assert!(image.pixels().any(|p| *p == TEXT_COLOR));
        assert!(!image.pixels().any(|p| *p == KNOWN_COLOR || *p == UNKNOWN_COLOR));
    }

    #[test]
    fn test_identities_reused_between_passes() {
        let matcher = ScriptedMatcher::with(
            vec![BoundingBox::new(40, 40, 30, 30)],
            vec![Identity::Known("alice".into())],
        );
        let mut throttle = RecognitionThrottle::new(10);

        for i in 0..12 {
            let processed = process_frame(&matcher, &mut throttle, frame(), "cam-1", 0.0);
            assert_eq!(processed.detections.len(), 1);
            assert_eq!(processed.detections[0].identity.label(), "alice");
            assert_eq!(processed.recognition_pass, i == 0 || i == 10);
        }
        assert_eq!(matcher.identify_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_face_count_change_triggers_pass() {
        let matcher = ScriptedMatcher::with(
            vec![BoundingBox::new(10, 10, 20, 20)],
            vec![Identity::Known("alice".into()), Identity::Known("bob".into())],
        );
        let mut throttle = RecognitionThrottle::new(100);

        process_frame(&matcher, &mut throttle, frame(), "cam-1", 0.0);
        process_frame(&matcher, &mut throttle, frame(), "cam-1", 0.0);
        assert_eq!(matcher.identify_calls.load(Ordering::SeqCst), 1);

        matcher.regions.lock().unwrap().push(BoundingBox::new(80, 10, 20, 20));
        let processed = process_frame(&matcher, &mut throttle, frame(), "cam-1", 0.0);
        assert_eq!(matcher.identify_calls.load(Ordering::SeqCst), 2);
        assert_eq!(processed.known_labels(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_identify_failure_falls_back_to_unknown() {
        let matcher = ScriptedMatcher {
            fail_identify: true,
            ..ScriptedMatcher::with(vec![BoundingBox::new(10, 10, 20, 20)], Vec::new())
        };
        let mut throttle = RecognitionThrottle::default();
        let processed = process_frame(&matcher, &mut throttle, frame(), "cam-1", 0.0);

        assert_eq!(processed.detections.len(), 1);
        assert_eq!(processed.detections[0].identity, Identity::Unknown);
        assert!(processed.known_labels().is_empty());
    }

    #[test]
    fn test_watermark_lines() {
        let lines = watermark("0123456789", 12.345, 2);
        assert_eq!(lines, vec!["01234567", "FPS: 12.3", "FACES: 2"]);
    }
}
