//! First-page PDF rasterization.
//!
//! Only page one is rendered, whatever the page count. The page is rendered
//! at `scale` × 72 dpi and re-encoded as JPEG.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{DynamicImage, ImageEncoder};
use tracing::{debug, info};

use super::encode::encode_base64;
use super::{IncomingFile, PendingImage};
use crate::error::{Result, TexSauceError};

/// PDF user-space resolution at scale 1.0.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders the first page of a PDF to a raster image.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render page one of `pdf` at `scale` (1.0 = 72 dpi).
    async fn render_first_page(&self, pdf: &Path, scale: f32) -> Result<DynamicImage>;
}

/// [`PageRasterizer`] backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    /// Use the given `pdftoppm` binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Find `pdftoppm`: the explicit path if given, else a `PATH` lookup.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Image`] if no usable binary is found.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self::new(path));
            }
            return Err(TexSauceError::Image(format!(
                "configured pdftoppm '{}' does not exist",
                path.display()
            )));
        }
        which::which("pdftoppm").map(Self::new).map_err(|e| {
            TexSauceError::Image(format!(
                "pdftoppm not found on PATH ({e}); install poppler-utils to read PDFs"
            ))
        })
    }

    /// Path of the binary in use.
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn render_first_page(&self, pdf: &Path, scale: f32) -> Result<DynamicImage> {
        let workdir = tempfile::tempdir()?;
        let prefix = workdir.path().join("page");
        let dpi = dpi_for_scale(scale);

        let output = tokio::process::Command::new(&self.binary)
            .args(["-f", "1", "-l", "1", "-singlefile", "-png", "-r"])
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| {
                TexSauceError::Image(format!(
                    "failed to execute {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TexSauceError::Image(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let png_path = prefix.with_extension("png");
        let bytes = tokio::fs::read(&png_path).await?;
        debug!(pdf = %pdf.display(), dpi, bytes = bytes.len(), "rendered first page");
        image::load_from_memory(&bytes)
            .map_err(|e| TexSauceError::Image(format!("failed to decode rendered page: {e}")))
    }
}

/// Stand-in used when no rasterizer could be set up; every PDF is reported
/// as failed with the recorded reason while images keep working.
#[derive(Debug, Clone)]
pub struct UnavailableRasterizer {
    reason: String,
}

impl UnavailableRasterizer {
    /// Record why PDFs cannot be read.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PageRasterizer for UnavailableRasterizer {
    async fn render_first_page(&self, _pdf: &Path, _scale: f32) -> Result<DynamicImage> {
        Err(TexSauceError::Image(self.reason.clone()))
    }
}

/// Rendering resolution for a PDF scale factor.
pub fn dpi_for_scale(scale: f32) -> u32 {
    (POINTS_PER_INCH * scale).round().max(1.0) as u32
}

/// Encode an image as JPEG at `quality` (1-100).
///
/// # Errors
///
/// [`TexSauceError::Image`] if encoding fails.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| TexSauceError::Image(format!("JPEG encode: {e}")))?;
    Ok(buf)
}

/// Rasterize page one of a PDF into a single JPEG [`PendingImage`].
///
/// # Errors
///
/// Rasterizer or encoder failures.
pub async fn rasterize_first_page(
    file: &IncomingFile,
    rasterizer: &dyn PageRasterizer,
    scale: f32,
    jpeg_quality: u8,
) -> Result<PendingImage> {
    let page = rasterizer.render_first_page(&file.path, scale).await?;
    let jpeg = encode_jpeg(&page, jpeg_quality)?;
    info!(
        file = %file.name,
        width = page.width(),
        height = page.height(),
        "PDF loaded (page 1)"
    );
    Ok(PendingImage::new(
        file.clone(),
        encode_base64(&jpeg),
        "image/jpeg".to_owned(),
    ))
}
