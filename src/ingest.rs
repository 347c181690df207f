use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};

use crate::errors::{CropscanError, Result};

/// Filename of the side file written before hosted-backend calls.
pub const UPLOAD_SIDE_FILE: &str = "uploaded_image.jpg";

/// An uploaded image in the two forms downstream consumers need: the decoded
/// raster and a re-encoded JPEG buffer.
#[derive(Debug)]
pub struct UploadedImage {
    pub image: DynamicImage,
    pub jpeg: Vec<u8>,
}

impl UploadedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Decode an uploaded blob and re-encode it as JPEG.
///
/// Format sniffing is content-based, so a PNG uploaded with a `.jpg` name still
/// decodes. Alpha is dropped during re-encoding since JPEG has no alpha channel.
pub fn decode_upload(bytes: &[u8]) -> Result<UploadedImage> {
    let image =
        image::load_from_memory(bytes).map_err(|e| CropscanError::ImageProcessing {
            operation: "upload decoding".to_string(),
            source: Box::new(e),
        })?;

    let mut jpeg = Vec::new();
    image
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| CropscanError::ImageProcessing {
            operation: "jpeg re-encoding".to_string(),
            source: Box::new(e),
        })?;

    Ok(UploadedImage { image, jpeg })
}

/// Write the re-encoded upload to `dir` as `uploaded_image.jpg` and return the
/// path. Overwrites any previous upload; the file is ephemeral by design.
pub fn persist_upload(dir: &Path, upload: &UploadedImage) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| CropscanError::FileSystem {
        path: dir.to_path_buf(),
        operation: "upload directory creation".to_string(),
        source: e,
    })?;

    let path = dir.join(UPLOAD_SIDE_FILE);
    fs::write(&path, &upload.jpeg).map_err(|e| CropscanError::FileSystem {
        path: path.clone(),
        operation: "upload side-file write".to_string(),
        source: e,
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 120, 40])));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .expect("png encoding");
        out
    }

    #[test]
    fn valid_upload_decodes_with_nonzero_dimensions() -> Result<()> {
        let upload = decode_upload(&png_bytes(224, 224))?;
        assert!(upload.image.width() >= 1 && upload.image.height() >= 1);
        assert_eq!(upload.dimensions(), (224, 224));
        Ok(())
    }

    #[test]
    fn reencoded_jpeg_decodes_to_same_dimensions() -> Result<()> {
        let upload = decode_upload(&png_bytes(64, 48))?;
        let roundtrip = image::load_from_memory(&upload.jpeg).expect("jpeg buffer decodes");
        assert_eq!((roundtrip.width(), roundtrip.height()), (64, 48));
        Ok(())
    }

    #[test]
    fn garbage_bytes_are_an_image_processing_error() {
        let err = decode_upload(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CropscanError::ImageProcessing { .. }));
    }

    #[test]
    fn persist_writes_the_side_file() -> Result<()> {
        let dir = TempDir::new().expect("temp dir");
        let upload = decode_upload(&png_bytes(8, 8))?;

        let path = persist_upload(dir.path(), &upload)?;
        assert_eq!(path.file_name().unwrap(), UPLOAD_SIDE_FILE);
        assert_eq!(fs::read(&path).expect("side file readable"), upload.jpeg);
        Ok(())
    }
}
