//! QR code artifact generation

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Luma, RgbaImage};
use qrcode::{EcLevel, QrCode};
use shortlink_core::ArtifactGenerator;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Pixels per QR module
const MODULE_SIZE: u32 = 10;

/// Share of the code's width and height covered by the centre image
const LOGO_SCALE: f64 = 0.2;

/// Renders QR codes as PNG files, optionally with an image pasted in the centre.
///
/// Codes use the highest error correction level so they still scan with the
/// centre covered.
#[derive(Clone, Default)]
pub struct QrCodeGenerator {
    logo: Option<Arc<RgbaImage>>,
}

impl QrCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the centre image once; it is reused for every code
    pub fn with_logo(path: &Path) -> Result<Self> {
        let logo = image::open(path).map_err(|e| {
            ServerError::Config(format!("cannot load QR centre image {:?}: {}", path, e))
        })?;
        info!(path = ?path, "Loaded QR centre image");

        Ok(Self {
            logo: Some(Arc::new(logo.to_rgba8())),
        })
    }
}

#[async_trait]
impl ArtifactGenerator for QrCodeGenerator {
    async fn generate(&self, content: &str, path: &Path) -> io::Result<()> {
        let content = content.to_string();
        let path = path.to_path_buf();
        let logo = self.logo.clone();

        tokio::task::spawn_blocking(move || render(&content, &path, logo.as_deref()))
            .await
            .map_err(io::Error::other)?
    }
}

fn render(content: &str, path: &Path, logo: Option<&RgbaImage>) -> io::Result<()> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::H)
        .map_err(io::Error::other)?;
    let code_image = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_SIZE, MODULE_SIZE)
        .build();

    let Some(logo) = logo else {
        code_image
            .save_with_format(path, ImageFormat::Png)
            .map_err(io::Error::other)?;
        debug!(path = ?path, "Rendered QR code");
        return Ok(());
    };

    let mut canvas = DynamicImage::ImageLuma8(code_image).to_rgba8();
    let (width, height) = canvas.dimensions();
    let logo_width = (f64::from(width) * LOGO_SCALE) as u32;
    let logo_height = (f64::from(height) * LOGO_SCALE) as u32;

    if logo_width > 0 && logo_height > 0 {
        let logo = imageops::resize(logo, logo_width, logo_height, FilterType::Triangle);
        let x = i64::from(width / 2) - i64::from(logo_width / 2);
        let y = i64::from(height / 2) - i64::from(logo_height / 2);
        imageops::replace(&mut canvas, &logo, x, y);
    }

    canvas
        .save_with_format(path, ImageFormat::Png)
        .map_err(io::Error::other)?;
    debug!(path = ?path, "Rendered QR code with centre image");
    Ok(())
}
