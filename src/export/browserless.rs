use crate::config::Config;
use crate::export::{RasterOptions, Rasterizer};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

pub const TOKEN_ENV: &str = "ZHAOWEN_BROWSERLESS_TOKEN";

/// Rasterizes HTML through a Browserless `/screenshot` endpoint.
pub struct BrowserlessRasterizer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessRasterizer {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create Browserless HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV).ok();
        Self::new(&config.browserless_url, token.as_deref())
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/screenshot", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }
}

#[async_trait]
impl Rasterizer for BrowserlessRasterizer {
    async fn rasterize(&self, html: &str, options: &RasterOptions) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&screenshot_body(html, options))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Browserless request failed")?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            bail!("Browserless error {}: {}", status, message);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read Browserless screenshot")?;

        Ok(bytes.to_vec())
    }
}

fn screenshot_body(html: &str, options: &RasterOptions) -> Value {
    json!({
        "html": html,
        "options": {
            "type": "png",
            "fullPage": true,
            "omitBackground": false
        },
        "viewport": {
            "width": options.width,
            "height": 1024,
            "deviceScaleFactor": 2
        },
        "gotoOptions": {
            "waitUntil": "networkidle2"
        }
    })
}
