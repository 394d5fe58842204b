use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{self, LanguageModel};
use crate::storage::models::{Article, Event};
use crate::storage::Database;
use crate::utils::{truncate_chars, ClipError, ClipResult};

/// 事件侧编排：批量分析建事件、生成综述、维护文章关联
pub struct EventWorkflow {
    db: Arc<Database>,
    model: Arc<dyn LanguageModel>,
}

impl EventWorkflow {
    pub fn new(db: Arc<Database>, model: Arc<dyn LanguageModel>) -> Self {
        Self { db, model }
    }

    /// 一次模型调用分析整批文章，按建议创建事件并建立关联。
    /// 响应解析失败是整体失败，不会写入任何行；
    /// 单条建议内的问题（日期解析不了、索引越界）用安全默认值跳过。
    /// 重复调用同一批文章总是创建新事件，不做去重
    pub async fn analyze_and_create_events(&self, articles: &[Article]) -> ClipResult<Vec<Event>> {
        if articles.is_empty() {
            return Err(ClipError::InvalidInput("没有可分析的文章".to_string()));
        }

        let prompt = ai::build_analysis_prompt(articles);
        let raw = self.model.complete(&prompt).await?;
        let analysis = ai::parse_event_analysis(&raw)?;

        if !analysis.summary.is_empty() {
            info!("整体时间线综述: {}", truncate_chars(&analysis.summary, 200));
        }

        let mut created = Vec::with_capacity(analysis.events.len());
        for suggestion in analysis.events {
            let mut event = Event {
                id: None,
                title: suggestion.title,
                description: non_empty(suggestion.description),
                event_date: parse_suggested_date(suggestion.date.as_deref()),
                created_date: Utc::now(),
                category: non_empty(suggestion.category),
                location: suggestion.location.and_then(non_empty),
                key_persons: non_empty(suggestion.key_persons.join(",")),
                summary: None,
                ai_generated: true,
            };

            let event_id = self.db.insert_event(&event).await?;
            event.id = Some(event_id);

            for index in suggestion.article_indices {
                // 模型输出不可信，越界索引直接跳过
                match articles.get(index).and_then(|a| a.id) {
                    Some(article_id) => {
                        self.db.link_article_to_event(article_id, event_id).await?;
                    }
                    None => warn!("模型给出的文章索引越界，跳过: {}", index),
                }
            }

            created.push(event);
        }

        info!("批量分析完成，创建了{}个事件", created.len());
        Ok(created)
    }

    /// 为事件生成叙事综述，成功整体替换summary，失败则原样保留
    pub async fn generate_event_summary(
        &self,
        event_id: i64,
        articles: &[Article],
    ) -> ClipResult<String> {
        let event = self
            .db
            .get_event(event_id)
            .await?
            .ok_or(ClipError::NotFound("事件", event_id))?;

        let prompt = ai::build_summary_prompt(&event, articles);
        let summary = self.model.complete(&prompt).await?;

        self.db.update_event_summary(event_id, &summary).await?;
        Ok(summary)
    }

    pub async fn link_article(&self, article_id: i64, event_id: i64) -> ClipResult<()> {
        self.db.link_article_to_event(article_id, event_id).await?;
        Ok(())
    }

    pub async fn unlink_article(&self, article_id: i64, event_id: i64) -> ClipResult<()> {
        self.db.unlink_article_from_event(article_id, event_id).await?;
        Ok(())
    }

    /// 删除事件，连带清理全部文章关联
    pub async fn delete(&self, event_id: i64) -> ClipResult<()> {
        self.db
            .get_event(event_id)
            .await?
            .ok_or(ClipError::NotFound("事件", event_id))?;

        self.db.delete_event(event_id).await?;
        info!("事件{}已删除", event_id);
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// 模型给的日期字符串解析成日历日期，解析不了按未知处理，绝不让整批失败
fn parse_suggested_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!("无法解析事件日期，按未知处理: {}", raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_date_parsing() {
        assert_eq!(
            parse_suggested_date(Some("2024-03-10")),
            NaiveDate::from_ymd_opt(2024, 3, 10)
        );
        assert_eq!(parse_suggested_date(Some(" 2024-03-10 ")), NaiveDate::from_ymd_opt(2024, 3, 10));
        assert_eq!(parse_suggested_date(Some("sometime in March")), None);
        assert_eq!(parse_suggested_date(Some("null")), None);
        assert_eq!(parse_suggested_date(Some("")), None);
        assert_eq!(parse_suggested_date(None), None);
    }

    #[test]
    fn non_empty_filters_blank() {
        assert_eq!(non_empty("  ".to_string()), None);
        assert_eq!(non_empty("Political".to_string()), Some("Political".to_string()));
    }
}
