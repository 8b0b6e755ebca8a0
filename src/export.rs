//! Saving result images to the user's picture directory.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};

use crate::error::BdrowResult;

/// Subdirectory created under the export root.
pub const EXPORT_SUBDIR: &str = "BananaDrawing";

const EXPORT_JPEG_QUALITY: u8 = 90;

/// Writes an image somewhere the user can find it. Blocking.
pub trait ImageExporter: Send + Sync {
    /// Returns the written path.
    fn export(&self, image: &RgbaImage) -> BdrowResult<PathBuf>;
}

/// Writes `{root}/BananaDrawing/banana_{unix_millis}.jpg`.
#[derive(Debug, Clone)]
pub struct PictureExporter {
    root: PathBuf,
}

impl PictureExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_dir(&self) -> PathBuf {
        self.root.join(EXPORT_SUBDIR)
    }
}

impl ImageExporter for PictureExporter {
    fn export(&self, image: &RgbaImage) -> BdrowResult<PathBuf> {
        let dir = self.target_dir();
        std::fs::create_dir_all(&dir)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("banana_{}.jpg", millis));

        let rgb: RgbImage = image.convert();
        let mut writer = BufWriter::new(File::create(&path)?);
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, EXPORT_JPEG_QUALITY))?;

        tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "image exported");
        Ok(path)
    }
}
