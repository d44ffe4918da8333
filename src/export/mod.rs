pub mod browserless;

use crate::config::Config;
use crate::report::Report;
use crate::report::render::{CardOptions, card_html};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_FAILURE_MESSAGE: &str = "导出图片失败，请重试";
const FILE_PREFIX: &str = "朝闻-早报";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOptions {
    pub background_color: String,
    pub width: u32,
}

impl RasterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            background_color: config.export_background.clone(),
            width: config.export_width,
        }
    }
}

/// Turns a self-contained HTML document into PNG bytes.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, html: &str, options: &RasterOptions) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub file_name: String,
    pub date: NaiveDate,
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    /// Plain ASCII name for clients that ignore RFC 5987 `filename*`.
    pub fn ascii_file_name(&self) -> String {
        format!("zhaowen-{}.png", self.date.format("%Y-%m-%d"))
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.bytes))
    }

    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)
            .with_context(|| format!("Failed to write exported image: {}", path.display()))?;

        Ok(path)
    }
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}-{}.png", date.format("%Y-%m-%d"))
}

/// Renders the report card with cache-busted image URLs and rasterizes it.
pub async fn render_report_image(
    rasterizer: &dyn Rasterizer,
    report: &Report,
    options: &RasterOptions,
) -> Result<ExportedImage> {
    let html = card_html(report, &CardOptions::for_export(&options.background_color));
    let bytes = rasterizer
        .rasterize(&html, options)
        .await
        .context("Failed to rasterize report card")?;

    if !bytes.starts_with(&PNG_SIGNATURE) {
        bail!("Rasterizer did not return a PNG image ({} bytes)", bytes.len());
    }

    let date = Utc::now().date_naive();
    let image = ExportedImage {
        file_name: export_file_name(date),
        date,
        bytes,
    };
    info!(file = %image.file_name, bytes = image.bytes.len(), "report card rasterized");

    Ok(image)
}
