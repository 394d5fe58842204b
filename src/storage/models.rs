use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 文章OCR处理状态，只能由 ArticleWorkflow 推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::str::FromStr for OcrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(OcrStatus::Pending),
            "processing" => Ok(OcrStatus::Processing),
            "completed" => Ok(OcrStatus::Completed),
            "failed" => Ok(OcrStatus::Failed),
            _ => Err(format!("未知的OCR状态: {}", s)),
        }
    }
}

/// 识别出的主要语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArticleLanguage {
    English,
    Urdu,
    Telugu,
    Mixed,
    Unknown,
}

impl ArticleLanguage {
    /// 模型按约定返回大写标签，未约定的标签一律归入 Unknown
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "ENGLISH" => ArticleLanguage::English,
            "URDU" => ArticleLanguage::Urdu,
            "TELUGU" => ArticleLanguage::Telugu,
            "MIXED" => ArticleLanguage::Mixed,
            _ => ArticleLanguage::Unknown,
        }
    }
}

/// 一张剪报
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: Option<i64>,
    pub image_path: String,
    pub thumbnail_path: Option<String>,
    pub ocr_text: Option<String>,
    pub newspaper_name: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub capture_date: DateTime<Utc>,
    pub language: Option<ArticleLanguage>,
    pub is_event_invitation: bool,
    pub drive_file_id: Option<String>,
    pub ocr_status: OcrStatus,
    pub tags: Option<String>,
    pub notes: Option<String>,
}

impl Article {
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            id: None,
            image_path: image_path.into(),
            thumbnail_path: None,
            ocr_text: None,
            newspaper_name: None,
            publication_date: None,
            capture_date: Utc::now(),
            language: None,
            is_event_invitation: false,
            drive_file_id: None,
            ocr_status: OcrStatus::Pending,
            tags: None,
            notes: None,
        }
    }
}

/// 由一篇或多篇文章推断出的现实事件
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub created_date: DateTime<Utc>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub key_persons: Option<String>,
    pub summary: Option<String>,
    pub ai_generated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_label_mapping() {
        assert_eq!(ArticleLanguage::from_label("TELUGU"), ArticleLanguage::Telugu);
        assert_eq!(ArticleLanguage::from_label(" english \n"), ArticleLanguage::English);
        assert_eq!(ArticleLanguage::from_label("HINDI"), ArticleLanguage::Unknown);
        assert_eq!(ArticleLanguage::from_label(""), ArticleLanguage::Unknown);
    }

    #[test]
    fn new_article_starts_pending() {
        let article = Article::new("data/images/a.jpg");
        assert_eq!(article.ocr_status, OcrStatus::Pending);
        assert!(article.ocr_text.is_none());
        assert!(article.id.is_none());
    }
}
