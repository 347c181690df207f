use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba};
use imageproc::drawing::draw_text_mut;

use crate::errors::{CropscanError, Result};
use crate::predictions::{Prediction, TOP_K};

/// Fixed top-left origin of the overlay block.
const TEXT_ORIGIN: (i32, i32) = (10, 10);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_SCALE: f32 = 16.0;

/// Common locations of a usable sans-serif TTF, checked when no font path is
/// configured.
const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws prediction lines onto a copy of an image.
pub struct Annotator {
    font: FontVec,
    scale: PxScale,
}

impl Annotator {
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| CropscanError::FileSystem {
            path: path.to_path_buf(),
            operation: "font file read".to_string(),
            source: e,
        })?;
        let font = FontVec::try_from_vec(data).map_err(|e| CropscanError::Configuration {
            message: format!("invalid font file {}: {e}", path.display()),
        })?;
        Ok(Self {
            font,
            scale: PxScale::from(TEXT_SCALE),
        })
    }

    /// Probe well-known system font locations.
    pub fn discover() -> Result<Self> {
        for candidate in FONT_SEARCH_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                if let Ok(annotator) = Self::from_path(path) {
                    tracing::debug!(font = candidate, "annotation font discovered");
                    return Ok(annotator);
                }
            }
        }
        Err(CropscanError::Configuration {
            message: "no annotation font found; pass --font-path".to_string(),
        })
    }

    /// Overlay up to five `"class confidence"` lines in white at the top-left
    /// corner of a copy of `image`. The input is never mutated and the output
    /// keeps its dimensions; text on a too-small image simply runs off-canvas.
    pub fn annotate(&self, image: &DynamicImage, predictions: &[Prediction]) -> DynamicImage {
        let mut canvas = image.to_rgba8();
        let line_height = (self.scale.y * 1.2).round() as i32;

        for (i, prediction) in predictions.iter().take(TOP_K).enumerate() {
            draw_text_mut(
                &mut canvas,
                TEXT_COLOR,
                TEXT_ORIGIN.0,
                TEXT_ORIGIN.1 + line_height * i as i32,
                self.scale,
                &self.font,
                &prediction.overlay_line(),
            );
        }

        DynamicImage::ImageRgba8(canvas)
    }
}
