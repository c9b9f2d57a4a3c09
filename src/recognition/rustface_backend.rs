use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::RgbImage;

use super::{BoundingBox, FaceMatcher, Identity};
use crate::error::CollaboratorError;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// Provides detection only: every face it finds is reported as
/// [`Identity::Unknown`]. Useful for relaying annotated streams before an
/// identification backend is available.
pub struct RustfaceMatcher {
    model: rustface::Model,
    min_face_size: u32,
}

impl RustfaceMatcher {
    /// Load a SeetaFace frontal model from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CollaboratorError::Matcher(format!("{}: {}", path.display(), e)))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| CollaboratorError::Matcher(format!("invalid model: {}", e)))?;
        Ok(Self {
            model,
            min_face_size: 20,
        })
    }

    /// Ignore faces smaller than `size` pixels
    pub fn min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }
}

impl FaceMatcher for RustfaceMatcher {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, CollaboratorError> {
        let gray = image::imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let x = bbox.x().max(0) as u32;
                let y = bbox.y().max(0) as u32;
                BoundingBox::new(
                    x,
                    y,
                    bbox.width().min(width.saturating_sub(x)),
                    bbox.height().min(height.saturating_sub(y)),
                )
            })
            .collect())
    }

    fn identify(
        &self,
        _image: &RgbImage,
        regions: &[BoundingBox],
    ) -> Result<Vec<Identity>, CollaboratorError> {
        Ok(vec![Identity::Unknown; regions.len()])
    }
}
