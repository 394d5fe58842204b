use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::config::AiConfig;
use crate::storage::models::{Article, Event};
use crate::utils::{truncate_chars, ClipError, ClipResult};

/// 批量分析时每篇文章送入提示词的OCR文本上限（字符数）
pub const ANALYSIS_TEXT_LIMIT: usize = 1000;
/// 生成事件综述时每篇文章的OCR文本上限
pub const SUMMARY_TEXT_LIMIT: usize = 500;
/// 语言识别只需要开头一小段
pub const LANGUAGE_TEXT_LIMIT: usize = 200;

/// 生成式语言模型协作方。输出是不可信的自由文本，
/// 由调用方负责要求JSON格式并做防御性解析
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> ClipResult<String>;
}

// ---------- Gemini REST 客户端 ----------

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: AiConfig,
}

impl GeminiClient {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> ClipResult<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.config.api_url, self.config.model, self.config.api_key
        );
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::Model(format!(
                "API返回错误 {}: {}",
                status,
                truncate_chars(&body, 200)
            )));
        }

        let body: GenerateResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ClipError::Model("模型返回为空".to_string()));
        }
        Ok(text)
    }
}

// ---------- 结构化响应 ----------

/// 单篇文章的结构化提取结果
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleInfo {
    pub is_event_invitation: bool,
    pub event_date: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub key_persons: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// 模型建议的一个事件，article_indices 按输入文章的0起始位置引用
#[derive(Debug, Clone, Deserialize)]
pub struct EventSuggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub date: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub key_persons: Vec<String>,
    #[serde(default)]
    pub article_indices: Vec<usize>,
}

/// 批量分析的完整响应
#[derive(Debug, Clone, Deserialize)]
pub struct EventAnalysis {
    pub events: Vec<EventSuggestion>,
    #[serde(default)]
    pub summary: String,
}

// ---------- 提示词 ----------

pub fn build_language_prompt(text: &str) -> String {
    format!(
        "Identify the primary language(s) in the following text.\n\
         Respond with one of: \"ENGLISH\", \"URDU\", \"TELUGU\", \"MIXED\", or \"UNKNOWN\"\n\
         \n\
         Text: {}",
        truncate_chars(text, LANGUAGE_TEXT_LIMIT)
    )
}

pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        "Extract structured information from this newspaper article text:\n\
         \n\
         {}\n\
         \n\
         Provide response in JSON format:\n\
         {{\n\
             \"is_event_invitation\": boolean,\n\
             \"event_date\": \"YYYY-MM-DD or null\",\n\
             \"location\": \"location or null\",\n\
             \"key_persons\": [\"person1\", \"person2\"],\n\
             \"tags\": [\"tag1\", \"tag2\"],\n\
             \"summary\": \"brief summary\"\n\
         }}",
        text
    )
}

/// 枚举全部输入文章的批量分析提示词，索引从0开始，
/// 与模型响应里的 article_indices 对应
pub fn build_analysis_prompt(articles: &[Article]) -> String {
    let mut articles_data = String::new();
    for (index, article) in articles.iter().enumerate() {
        let date = article
            .publication_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let text = article
            .ocr_text
            .as_deref()
            .map(|t| truncate_chars(t, ANALYSIS_TEXT_LIMIT))
            .unwrap_or("No text");
        let _ = write!(
            articles_data,
            "Article {index}:\n\
             Newspaper: {newspaper}\n\
             Date: {date}\n\
             Is Event Invitation: {invitation}\n\
             Text: {text}\n\
             ---\n\n",
            index = index,
            newspaper = article.newspaper_name.as_deref().unwrap_or("Unknown"),
            date = date,
            invitation = article.is_event_invitation,
            text = text,
        );
    }

    format!(
        "You are an AI assistant specialized in analyzing newspaper articles and creating chronological event timelines.\n\
         \n\
         Analyze the following newspaper articles (in English, Urdu, and Telugu) and:\n\
         1. Identify distinct events mentioned or described\n\
         2. Group related articles that discuss the same event\n\
         3. Extract key information: event title, description, date, location, key persons involved\n\
         4. Create a chronological timeline of events\n\
         5. Provide a summary of the overall narrative\n\
         \n\
         Articles:\n\
         {articles_data}\n\
         Please respond in JSON format with the following structure:\n\
         {{\n\
             \"events\": [\n\
                 {{\n\
                     \"title\": \"Event title\",\n\
                     \"description\": \"Detailed description\",\n\
                     \"category\": \"Category (e.g., Political, Cultural, Sports, Business)\",\n\
                     \"date\": \"YYYY-MM-DD or null if unknown\",\n\
                     \"location\": \"Location or null\",\n\
                     \"key_persons\": [\"Person 1\", \"Person 2\"],\n\
                     \"article_indices\": [0, 2, 5]\n\
                 }}\n\
             ],\n\
             \"summary\": \"Overall narrative summary connecting all events\"\n\
         }}\n\
         \n\
         Important:\n\
         - article_indices should reference the article numbers (0-based index) that relate to this event\n\
         - If multiple articles discuss the same event, group them together\n\
         - Sort events chronologically where dates are known\n\
         - For event invitations, extract the event details they're inviting to\n\
         - Handle mixed languages (English, Urdu, Telugu) in the text",
        articles_data = articles_data,
    )
}

pub fn build_summary_prompt(event: &Event, articles: &[Article]) -> String {
    let mut articles_text = String::new();
    for article in articles {
        let date = article
            .publication_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let text = article
            .ocr_text
            .as_deref()
            .map(|t| truncate_chars(t, SUMMARY_TEXT_LIMIT))
            .unwrap_or("No text");
        let _ = write!(
            articles_text,
            "From {newspaper} ({date}):\n{text}\n\n",
            newspaper = article.newspaper_name.as_deref().unwrap_or("Unknown"),
            date = date,
            text = text,
        );
    }

    format!(
        "Create a comprehensive summary for the following event based on multiple newspaper articles:\n\
         \n\
         Event: {title}\n\
         Description: {description}\n\
         Date: {date}\n\
         \n\
         Related Articles:\n\
         {articles_text}\n\
         Please provide a well-structured summary that:\n\
         1. Combines information from all articles\n\
         2. Maintains chronological order if applicable\n\
         3. Highlights key facts, persons, and outcomes\n\
         4. Resolves any conflicting information\n\
         5. Keeps it concise but comprehensive (200-300 words)",
        title = event.title,
        description = event.description.as_deref().unwrap_or(""),
        date = event
            .event_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
        articles_text = articles_text,
    )
}

// ---------- 防御性解析 ----------

/// 模型经常把JSON包在markdown代码块里，解析前先剥掉
pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .unwrap_or(t);
    let t = t.strip_suffix("```").unwrap_or(t);
    t.trim()
}

pub fn parse_article_info(raw: &str) -> ClipResult<ArticleInfo> {
    serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ClipError::MalformedResponse(format!("文章信息解析失败: {}", e)))
}

/// 整个响应解析失败即整体失败，绝不从畸形响应里猜出部分事件
pub fn parse_event_analysis(raw: &str) -> ClipResult<EventAnalysis> {
    serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ClipError::MalformedResponse(format!("事件分析解析失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use crate::storage::models::OcrStatus;

    #[test]
    fn strip_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn parse_analysis_happy_path() {
        let raw = r#"```json
        {
            "events": [
                {
                    "title": "City council meeting",
                    "description": "Budget discussion",
                    "category": "Political",
                    "date": "2024-03-10",
                    "location": "Hyderabad",
                    "key_persons": ["Mayor Rao"],
                    "article_indices": [0, 1]
                }
            ],
            "summary": "A single council meeting covered by two papers."
        }
        ```"#;

        let analysis = parse_event_analysis(raw).unwrap();
        assert_eq!(analysis.events.len(), 1);
        assert_eq!(analysis.events[0].title, "City council meeting");
        assert_eq!(analysis.events[0].article_indices, vec![0, 1]);
        assert_eq!(analysis.events[0].date.as_deref(), Some("2024-03-10"));
    }

    #[test]
    fn parse_analysis_malformed_is_error() {
        let err = parse_event_analysis("对不起，我无法分析这些文章。").unwrap_err();
        assert!(matches!(err, ClipError::MalformedResponse(_)));
    }

    #[test]
    fn parse_analysis_missing_title_is_error() {
        // title是必填字段，缺了就按整体格式错误处理
        let raw = r#"{"events": [{"description": "no title"}], "summary": ""}"#;
        let err = parse_event_analysis(raw).unwrap_err();
        assert!(matches!(err, ClipError::MalformedResponse(_)));
    }

    #[test]
    fn parse_article_info_defaults_optional_fields() {
        let raw = r#"{"is_event_invitation": true, "event_date": null, "location": null}"#;
        let info = parse_article_info(raw).unwrap();
        assert!(info.is_event_invitation);
        assert!(info.tags.is_empty());
        assert!(info.key_persons.is_empty());
    }

    #[test]
    fn analysis_prompt_enumerates_zero_based() {
        let mut first = Article::new("a.jpg");
        first.newspaper_name = Some("The Hindu".to_string());
        first.publication_date = NaiveDate::from_ymd_opt(2024, 3, 8);
        first.ocr_text = Some("council meeting".to_string());
        first.ocr_status = OcrStatus::Completed;
        let second = Article::new("b.jpg");

        let prompt = build_analysis_prompt(&[first, second]);
        assert!(prompt.contains("Article 0:"));
        assert!(prompt.contains("Article 1:"));
        assert!(prompt.contains("Newspaper: The Hindu"));
        assert!(prompt.contains("Date: 2024-03-08"));
        assert!(prompt.contains("Text: No text"));
    }

    #[test]
    fn analysis_prompt_truncates_long_text() {
        let mut article = Article::new("a.jpg");
        article.ocr_text = Some("x".repeat(ANALYSIS_TEXT_LIMIT * 2));
        let prompt = build_analysis_prompt(std::slice::from_ref(&article));
        // 提示词里不应出现超过上限的连续文本
        assert!(!prompt.contains(&"x".repeat(ANALYSIS_TEXT_LIMIT + 1)));
        assert!(prompt.contains(&"x".repeat(ANALYSIS_TEXT_LIMIT)));
    }

    #[test]
    fn summary_prompt_includes_event_fields() {
        let event = Event {
            id: Some(1),
            title: "Temple festival".to_string(),
            description: Some("Annual festival".to_string()),
            event_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            created_date: Utc::now(),
            category: None,
            location: None,
            key_persons: None,
            summary: None,
            ai_generated: true,
        };
        let prompt = build_summary_prompt(&event, &[]);
        assert!(prompt.contains("Event: Temple festival"));
        assert!(prompt.contains("Date: 2024-04-01"));
        assert!(prompt.contains("200-300 words"));
    }
}
