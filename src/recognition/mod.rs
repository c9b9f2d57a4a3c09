//! Face recognition capability
//!
//! The relay does not implement recognition itself. It consumes a
//! [`FaceMatcher`] in two steps so that the expensive identification step
//! can be throttled independently of cheap per-frame detection (see
//! [`RecognitionThrottle`]).

pub mod throttle;

#[cfg(feature = "rustface")]
pub mod rustface_backend;

use image::RgbImage;
use serde::Serialize;

use crate::error::CollaboratorError;

pub use throttle::RecognitionThrottle;

#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceMatcher;

/// Label drawn for faces that matched no known identity
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Axis-aligned face region in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Outcome of identifying one face
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Identity {
    /// Matched a known person
    Known(String),
    /// Matched nobody; a valid result, not an error
    Unknown,
}

impl Identity {
    /// Text drawn next to the face
    pub fn label(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Check if this is a known identity
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

/// One face found in a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub region: BoundingBox,
    pub identity: Identity,
}

impl Detection {
    pub fn new(region: BoundingBox, identity: Identity) -> Self {
        Self { region, identity }
    }
}

/// Pluggable face detection and identification
///
/// Calls are synchronous and may be slow; the worker runs them on the
/// blocking thread pool.
pub trait FaceMatcher: Send + Sync {
    /// Locate faces in the frame
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, CollaboratorError>;

    /// Identify each region, returning one identity per region in order
    fn identify(
        &self,
        image: &RgbImage,
        regions: &[BoundingBox],
    ) -> Result<Vec<Identity>, CollaboratorError>;

    /// Detect and identify in one call
    fn analyze(&self, image: &RgbImage) -> Result<Vec<Detection>, CollaboratorError> {
        let regions = self.detect(image)?;
        let identities = self.identify(image, &regions)?;
        Ok(regions
            .into_iter()
            .zip(identities.into_iter().chain(std::iter::repeat(Identity::Unknown)))
            .map(|(region, identity)| Detection::new(region, identity))
            .collect())
    }
}

/// Matcher that never finds a face
///
/// Used when no recognition backend is configured; frames are still relayed
/// and watermarked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMatcher;

impl FaceMatcher for NullMatcher {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, CollaboratorError> {
        Ok(Vec::new())
    }

    fn identify(
        &self,
        _image: &RgbImage,
        regions: &[BoundingBox],
    ) -> Result<Vec<Identity>, CollaboratorError> {
        Ok(vec![Identity::Unknown; regions.len()])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Matcher returning scripted results, counting identify calls
    #[derive(Default)]
    pub(crate) struct ScriptedMatcher {
        pub(crate) regions: Mutex<Vec<BoundingBox>>,
        pub(crate) identities: Mutex<Vec<Identity>>,
        pub(crate) identify_calls: AtomicUsize,
        pub(crate) fail_identify: bool,
    }

    impl ScriptedMatcher {
        pub(crate) fn with(regions: Vec<BoundingBox>, identities: Vec<Identity>) -> Self {
            Self {
                regions: Mutex::new(regions),
                identities: Mutex::new(identities),
                ..Default::default()
            }
        }
    }

    impl FaceMatcher for ScriptedMatcher {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, CollaboratorError> {
            Ok(self.regions.lock().unwrap().clone())
        }

        fn identify(
            &self,
            _image: &RgbImage,
            regions: &[BoundingBox],
        ) -> Result<Vec<Identity>, CollaboratorError> {
            self.identify_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_identify {
                return Err(CollaboratorError::Matcher("model unavailable".into()));
            }
            let identities = self.identities.lock().unwrap();
            Ok(identities.iter().take(regions.len()).cloned().collect())
        }
    }

    #[test]
    fn test_identity_label() {
        assert_eq!(Identity::Known("alice".into()).label(), "alice");
        assert_eq!(Identity::Unknown.label(), UNKNOWN_LABEL);
        assert!(Identity::Known("bob".into()).is_known());
        assert!(!Identity::Unknown.is_known());
    }

    #[test]
    fn test_null_matcher_finds_nothing() {
        let image = RgbImage::new(32, 32);
        assert!(NullMatcher.analyze(&image).unwrap().is_empty());
    }

    #[test]
    fn test_analyze_pads_missing_identities() {
        let matcher = ScriptedMatcher::with(
            vec![BoundingBox::new(0, 0, 4, 4), BoundingBox::new(8, 8, 4, 4)],
            vec![Identity::Known("alice".into())],
        );
        let detections = matcher.analyze(&RgbImage::new(16, 16)).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].identity, Identity::Known("alice".into()));
        assert_eq!(detections[1].identity, Identity::Unknown);
    }
}
