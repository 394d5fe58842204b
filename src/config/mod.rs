use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use anyhow::Result;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub ocr: OcrConfig,
    pub ai: AiConfig,
    pub drive: DriveConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    pub tesseract_path: String,
    pub languages: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    pub access_token: String,
    pub api_url: String,
    pub upload_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_path: String,
    pub images_dir: String,
    pub thumbs_dir: String,
    pub reports_dir: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/settings.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl AiConfig {
    /// 检查 API key 是否已配置
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != "your-gemini-api-key"
    }
}

impl DriveConfig {
    /// 检查访问令牌是否已配置（登录流程在本工具之外完成）
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ocr: OcrConfig {
                tesseract_path: "tesseract".to_string(),
                languages: "eng+urd+tel".to_string(),
            },
            ai: AiConfig {
                api_key: "your-gemini-api-key".to_string(),
                api_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
                model: "gemini-pro".to_string(),
                temperature: 0.2,
            },
            drive: DriveConfig {
                access_token: String::new(),
                api_url: "https://www.googleapis.com/drive/v3".to_string(),
                upload_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            },
            storage: StorageConfig {
                database_path: "./data/clipbot.db".to_string(),
                images_dir: "data/images".to_string(),
                thumbs_dir: "data/thumbs".to_string(),
                reports_dir: "data/reports".to_string(),
            },
        }
    }
}
