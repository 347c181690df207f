use crate::errors::Result;
use crate::ingest::UploadedImage;
use crate::predictions::Prediction;
use crate::source::PredictionSource;

/// Canned prediction source for tests.
#[derive(Debug, Clone)]
pub struct MockPredictionSource {
    pub backend_name: String,
    pub predictions: Vec<Prediction>,
}

impl MockPredictionSource {
    pub fn new(backend_name: impl Into<String>, predictions: Vec<Prediction>) -> Self {
        Self {
            backend_name: backend_name.into(),
            predictions,
        }
    }

    /// A source that returns nothing, for exercising the empty-result path.
    pub fn empty(backend_name: impl Into<String>) -> Self {
        Self::new(backend_name, Vec::new())
    }
}

impl PredictionSource for MockPredictionSource {
    fn name(&self) -> &str {
        &self.backend_name
    }

    fn predict(&self, _upload: &UploadedImage) -> Result<Vec<Prediction>> {
        Ok(self.predictions.clone())
    }
}

/// Factory for the mock most tests want: an unambiguous healthy/blight split.
pub fn create_mock_source() -> MockPredictionSource {
    MockPredictionSource::new(
        "mock",
        vec![
            Prediction::new("healthy", 0.91),
            Prediction::new("blight", 0.05),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::decode_upload;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn upload() -> UploadedImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([0, 128, 0])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("png encoding");
        decode_upload(&bytes).expect("upload decodes")
    }

    #[test]
    fn mock_source_returns_canned_predictions() -> Result<()> {
        let mock = create_mock_source();
        let predictions = mock.predict(&upload())?;
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].class_name, "healthy");
        Ok(())
    }

    #[test]
    fn empty_mock_returns_no_predictions() -> Result<()> {
        let mock = MockPredictionSource::empty("hosted");
        assert_eq!(mock.name(), "hosted");
        assert!(mock.predict(&upload())?.is_empty());
        Ok(())
    }
}
