use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{self, LanguageModel};
use crate::drive::RemoteStore;
use crate::ocr::TextRecognizer;
use crate::storage::models::{ArticleLanguage, OcrStatus};
use crate::storage::Database;
use crate::utils::{ClipError, ClipResult};

/// 单篇文章的处理编排：拍摄登记 → OCR → AI补充信息 → 云端备份。
/// 自身不持有任何状态，结果全部落在存储层
pub struct ArticleWorkflow {
    db: Arc<Database>,
    ocr: Arc<dyn TextRecognizer>,
    model: Arc<dyn LanguageModel>,
    remote: Arc<dyn RemoteStore>,
}

impl ArticleWorkflow {
    pub fn new(
        db: Arc<Database>,
        ocr: Arc<dyn TextRecognizer>,
        model: Arc<dyn LanguageModel>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self { db, ocr, model, remote }
    }

    /// OCR状态机: Pending → Processing → Completed/Failed。
    /// Failed与Completed都可以重新触发，按新一轮处理。
    /// 返回最终识别文本；OCR失败时置Failed并向上传播
    pub async fn process(&self, article_id: i64) -> ClipResult<String> {
        let article = self
            .db
            .get_article(article_id)
            .await?
            .ok_or(ClipError::NotFound("文章", article_id))?;

        // 先落Processing并清掉旧文本，并发读取方看到的是"处理中"而非过期结果
        self.db
            .update_ocr_result(article_id, OcrStatus::Processing, None)
            .await?;

        let text = match self.ocr.recognize(&article.image_path).await {
            Ok(text) => text,
            Err(e) => {
                self.db
                    .update_ocr_result(article_id, OcrStatus::Failed, None)
                    .await?;
                return Err(e);
            }
        };

        self.db
            .update_ocr_result(article_id, OcrStatus::Completed, Some(&text))
            .await?;
        info!("OCR完成: 文章{}，文本长度{}", article_id, text.chars().count());

        // 第二阶段：尽力而为的AI补充信息，任何失败只记日志，不改变OCR结果
        self.enrich(article_id, &text).await;

        Ok(text)
    }

    async fn enrich(&self, article_id: i64, text: &str) {
        match self.model.complete(&ai::build_language_prompt(text)).await {
            Ok(raw) => {
                let language = ArticleLanguage::from_label(&raw);
                if let Err(e) = self.db.update_language(article_id, language).await {
                    warn!("语言写入失败: {}", e);
                }
            }
            Err(e) => warn!("语言识别失败: {}", e),
        }

        match self.model.complete(&ai::build_extraction_prompt(text)).await {
            Ok(raw) => match ai::parse_article_info(&raw) {
                Ok(info) => {
                    let tags = info.tags.join(",");
                    if let Err(e) = self
                        .db
                        .update_article_info(article_id, info.is_event_invitation, &tags)
                        .await
                    {
                        warn!("文章信息写入失败: {}", e);
                    }
                }
                Err(e) => warn!("{}", e),
            },
            Err(e) => warn!("文章信息提取失败: {}", e),
        }
    }

    /// 上传文章图片到云端备份。成功才写入远端ID，失败不动文章
    pub async fn upload(&self, article_id: i64) -> ClipResult<String> {
        let article = self
            .db
            .get_article(article_id)
            .await?
            .ok_or(ClipError::NotFound("文章", article_id))?;

        let name = format!("article_{}_{}.jpg", article_id, Utc::now().timestamp_millis());
        let file_id = self.remote.upload(&article.image_path, &name).await?;
        self.db.update_drive_file_id(article_id, &file_id).await?;
        Ok(file_id)
    }

    /// 删除文章。云端备份尽力清理，失败不阻止本地删除；
    /// 本地删除在一个事务内连带清理全部事件关联
    pub async fn delete(&self, article_id: i64) -> ClipResult<()> {
        let article = self
            .db
            .get_article(article_id)
            .await?
            .ok_or(ClipError::NotFound("文章", article_id))?;

        if let Some(ref file_id) = article.drive_file_id {
            if let Err(e) = self.remote.delete(file_id).await {
                warn!("云端备份删除失败: {}", e);
            }
        }

        self.db.delete_article(article_id).await?;
        info!("文章{}已删除", article_id);
        Ok(())
    }
}
