use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".zhaowen";
const CONFIG_FILE: &str = "config.json";
const MIN_TIMEOUT_SECONDS: u64 = 5;

/// Persisted settings. The AI credential is deliberately absent: it is only
/// ever read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_port: u16,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: Option<u64>,
    pub export_dir: PathBuf,
    pub export_background: String,
    pub export_width: u32,
    pub browserless_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_port: 7891,
            ai_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ai_model: "gemini-2.5-flash".to_string(),
            ai_timeout_seconds: None,
            export_dir: default_export_dir(),
            export_background: "#fffbf7".to_string(),
            export_width: 768,
            browserless_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// Falls back to defaults when no config file has been written yet.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_export_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.export_dir).with_context(|| {
            format!(
                "Failed to create export directory: {}",
                self.export_dir.display()
            )
        })
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                let model = value.trim();
                if model.is_empty() {
                    bail!("ai_model must not be empty");
                }
                self.ai_model = model.to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = match value.trim() {
                    "" | "none" | "default" => None,
                    raw => Some(
                        raw.parse::<u64>()
                            .map_err(|_| anyhow!("ai_timeout_seconds must be a number or `none`"))?
                            .max(MIN_TIMEOUT_SECONDS),
                    ),
                };
            }
            "export_dir" => {
                self.export_dir = expand_home(value.trim());
            }
            "export_background" => {
                let color = value.trim();
                if !is_hex_color(color) {
                    bail!("export_background must be a hex color such as #fffbf7");
                }
                self.export_background = color.to_string();
            }
            "export_width" => {
                self.export_width = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("export_width must be a number"))?
                    .clamp(320, 2048);
            }
            "browserless_url" => {
                self.browserless_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_api_key" => {
                bail!(
                    "The API key is never stored in the config file. Export `ZHAOWEN_API_KEY` instead."
                );
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: api_port|api.port, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds, export_dir|export.dir, export_background|export.background, export_width|export.width, browserless_url|browserless.url"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "api_port" => Some(self.api_port.to_string()),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(
                self.ai_timeout_seconds
                    .map(|seconds| seconds.to_string())
                    .unwrap_or_else(|| "default".to_string()),
            ),
            "export_dir" => Some(self.export_dir.display().to_string()),
            "export_background" => Some(self.export_background.clone()),
            "export_width" => Some(self.export_width.to_string()),
            "browserless_url" => Some(self.browserless_url.clone()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "api_port" | "api.port" => "api_port",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "export_dir" | "export.dir" => "export_dir",
        "export_background" | "export.background" => "export_background",
        "export_width" | "export.width" => "export_width",
        "browserless_url" | "browserless.url" => "browserless_url",
        _ => key,
    }
}

fn is_hex_color(value: &str) -> bool {
    value.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6) && hex.chars().all(|ch| ch.is_ascii_hexdigit())
    })
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

pub fn default_export_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Pictures")
        .join("Zhaowen")
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
