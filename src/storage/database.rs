use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tokio::sync::broadcast;
use tracing::info;

use crate::storage::models::{Article, ArticleLanguage, Event, OcrStatus};

type DbResult<T> = Result<T, sqlx::Error>;

/// 存储层变更通知，订阅方收到后重新查询即可
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Articles,
    Events,
}

pub struct Database {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl Database {
    pub async fn new(database_url: &str) -> DbResult<Self> {
        // 确保使用create_if_missing选项
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url.parse::<sqlx::sqlite::SqliteConnectOptions>()?
                    .create_if_missing(true)
            )
            .await?;

        let (changes, _) = broadcast::channel(64);
        info!("数据库连接成功: {}", database_url);
        Ok(Self { pool, changes })
    }

    pub async fn init_schema(&self) -> DbResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image_path TEXT NOT NULL,
                thumbnail_path TEXT,
                ocr_text TEXT,
                newspaper_name TEXT,
                publication_date TEXT,
                capture_date TEXT NOT NULL,
                language TEXT,
                is_event_invitation INTEGER NOT NULL DEFAULT 0,
                drive_file_id TEXT,
                ocr_status TEXT NOT NULL DEFAULT 'pending',
                tags TEXT,
                notes TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                event_date TEXT,
                created_date TEXT NOT NULL,
                category TEXT,
                location TEXT,
                key_persons TEXT,
                summary TEXT,
                ai_generated INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 纯关联表，文章与事件多对多的唯一事实来源
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_event (
                article_id INTEGER NOT NULL,
                event_id INTEGER NOT NULL,
                PRIMARY KEY (article_id, event_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 订阅存储层变更
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // 没有订阅者时send会失败，忽略即可
        let _ = self.changes.send(change);
    }

    // ---------- 文章 ----------

    pub async fn insert_article(&self, article: &Article) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (image_path, thumbnail_path, ocr_text, newspaper_name,
                publication_date, capture_date, language, is_event_invitation,
                drive_file_id, ocr_status, tags, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.image_path)
        .bind(&article.thumbnail_path)
        .bind(&article.ocr_text)
        .bind(&article.newspaper_name)
        .bind(article.publication_date)
        .bind(article.capture_date)
        .bind(article.language)
        .bind(article.is_event_invitation)
        .bind(&article.drive_file_id)
        .bind(article.ocr_status)
        .bind(&article.tags)
        .bind(&article.notes)
        .execute(&self.pool)
        .await?;

        self.notify(StoreChange::Articles);
        Ok(result.last_insert_rowid())
    }

    pub async fn get_article(&self, article_id: i64) -> DbResult<Option<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_articles(&self) -> DbResult<Vec<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM articles ORDER BY capture_date DESC")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_articles_by_status(&self, status: OcrStatus) -> DbResult<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE ocr_status = ? ORDER BY capture_date DESC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_event_invitations(&self) -> DbResult<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE is_event_invitation = 1 ORDER BY publication_date DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn search_articles(&self, query: &str) -> DbResult<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE ocr_text LIKE '%' || ? || '%' ORDER BY capture_date DESC",
        )
        .bind(query)
        .fetch_all(&self.pool)
        .await
    }

    /// 写入OCR状态与文本，两者始终一起更新
    pub async fn update_ocr_result(
        &self,
        article_id: i64,
        status: OcrStatus,
        ocr_text: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE articles SET ocr_status = ?, ocr_text = ? WHERE id = ?")
            .bind(status)
            .bind(ocr_text)
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Articles);
        Ok(())
    }

    pub async fn update_language(&self, article_id: i64, language: ArticleLanguage) -> DbResult<()> {
        sqlx::query("UPDATE articles SET language = ? WHERE id = ?")
            .bind(language)
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Articles);
        Ok(())
    }

    pub async fn update_article_info(
        &self,
        article_id: i64,
        is_event_invitation: bool,
        tags: &str,
    ) -> DbResult<()> {
        sqlx::query("UPDATE articles SET is_event_invitation = ?, tags = ? WHERE id = ?")
            .bind(is_event_invitation)
            .bind(tags)
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Articles);
        Ok(())
    }

    pub async fn update_drive_file_id(&self, article_id: i64, drive_file_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE articles SET drive_file_id = ? WHERE id = ?")
            .bind(drive_file_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Articles);
        Ok(())
    }

    /// 删除文章，同一事务内先清理关联，避免残留孤儿关联行
    pub async fn delete_article(&self, article_id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM article_event WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.notify(StoreChange::Articles);
        self.notify(StoreChange::Events);
        Ok(())
    }

    // ---------- 事件 ----------

    pub async fn insert_event(&self, event: &Event) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (title, description, event_date, created_date,
                category, location, key_persons, summary, ai_generated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(event.created_date)
        .bind(&event.category)
        .bind(&event.location)
        .bind(&event.key_persons)
        .bind(&event.summary)
        .bind(event.ai_generated)
        .execute(&self.pool)
        .await?;

        self.notify(StoreChange::Events);
        Ok(result.last_insert_rowid())
    }

    pub async fn get_event(&self, event_id: i64) -> DbResult<Option<Event>> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_events(&self) -> DbResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            "SELECT * FROM events ORDER BY event_date DESC, created_date DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// 整体替换事件综述，不存在部分写入
    pub async fn update_event_summary(&self, event_id: i64, summary: &str) -> DbResult<()> {
        sqlx::query("UPDATE events SET summary = ? WHERE id = ?")
            .bind(summary)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Events);
        Ok(())
    }

    /// 删除事件，同一事务内先清理关联
    pub async fn delete_event(&self, event_id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM article_event WHERE event_id = ?")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.notify(StoreChange::Events);
        Ok(())
    }

    // ---------- 关联 ----------

    /// 幂等插入，重复关联同一对文章与事件不报错
    pub async fn link_article_to_event(&self, article_id: i64, event_id: i64) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO article_event (article_id, event_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Events);
        Ok(())
    }

    /// 幂等删除，关联不存在也算成功
    pub async fn unlink_article_from_event(&self, article_id: i64, event_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM article_event WHERE article_id = ? AND event_id = ?")
            .bind(article_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Events);
        Ok(())
    }

    pub async fn articles_for_event(&self, event_id: i64) -> DbResult<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT a.* FROM articles a
            JOIN article_event ae ON ae.article_id = a.id
            WHERE ae.event_id = ?
            ORDER BY a.publication_date
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_links(&self) -> DbResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM article_event")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn clear_all_tables(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM article_event").execute(&self.pool).await?;
        sqlx::query("DELETE FROM events").execute(&self.pool).await?;
        sqlx::query("DELETE FROM articles").execute(&self.pool).await?;

        self.notify(StoreChange::Articles);
        self.notify(StoreChange::Events);
        info!("数据库表已清空");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    async fn test_db(dir: &tempfile::TempDir) -> Database {
        let url = format!("sqlite:{}/test.db", dir.path().display());
        let db = Database::new(&url).await.unwrap();
        db.init_schema().await.unwrap();
        db
    }

    fn sample_event(title: &str) -> Event {
        Event {
            id: None,
            title: title.to_string(),
            description: None,
            event_date: Some(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()),
            created_date: Utc::now(),
            category: None,
            location: None,
            key_persons: None,
            summary: None,
            ai_generated: true,
        }
    }

    #[tokio::test]
    async fn article_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        let mut article = Article::new("data/images/a.jpg");
        article.newspaper_name = Some("Eenadu".to_string());
        article.publication_date = NaiveDate::from_ymd_opt(2024, 3, 8);
        let id = db.insert_article(&article).await.unwrap();

        let loaded = db.get_article(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.newspaper_name.as_deref(), Some("Eenadu"));
        assert_eq!(loaded.ocr_status, OcrStatus::Pending);
        assert!(loaded.ocr_text.is_none());
    }

    #[tokio::test]
    async fn ocr_result_update_sets_status_and_text_together() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let id = db.insert_article(&Article::new("a.jpg")).await.unwrap();

        db.update_ocr_result(id, OcrStatus::Completed, Some("识别文本"))
            .await
            .unwrap();
        let loaded = db.get_article(id).await.unwrap().unwrap();
        assert_eq!(loaded.ocr_status, OcrStatus::Completed);
        assert_eq!(loaded.ocr_text.as_deref(), Some("识别文本"));

        db.update_ocr_result(id, OcrStatus::Processing, None).await.unwrap();
        let loaded = db.get_article(id).await.unwrap().unwrap();
        assert_eq!(loaded.ocr_status, OcrStatus::Processing);
        assert!(loaded.ocr_text.is_none());
    }

    #[tokio::test]
    async fn search_matches_ocr_text() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let hit = db.insert_article(&Article::new("a.jpg")).await.unwrap();
        let miss = db.insert_article(&Article::new("b.jpg")).await.unwrap();
        db.update_ocr_result(hit, OcrStatus::Completed, Some("city council meeting"))
            .await
            .unwrap();
        db.update_ocr_result(miss, OcrStatus::Completed, Some("cricket scores"))
            .await
            .unwrap();

        let found = db.search_articles("council").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(hit));

        assert!(db.search_articles("假新闻").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invitation_filter_returns_only_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let mut invitation = Article::new("a.jpg");
        invitation.is_event_invitation = true;
        let invitation_id = db.insert_article(&invitation).await.unwrap();
        db.insert_article(&Article::new("b.jpg")).await.unwrap();

        let flagged = db.list_event_invitations().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, Some(invitation_id));
    }

    #[tokio::test]
    async fn link_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let article_id = db.insert_article(&Article::new("a.jpg")).await.unwrap();
        let event_id = db.insert_event(&sample_event("市政会议")).await.unwrap();

        db.link_article_to_event(article_id, event_id).await.unwrap();
        db.link_article_to_event(article_id, event_id).await.unwrap();
        assert_eq!(db.count_links().await.unwrap(), 1);

        // 不存在的关联删除也是成功
        db.unlink_article_from_event(article_id, 999).await.unwrap();
        db.unlink_article_from_event(article_id, event_id).await.unwrap();
        assert_eq!(db.count_links().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_article_removes_its_links() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let article_id = db.insert_article(&Article::new("a.jpg")).await.unwrap();
        let other_id = db.insert_article(&Article::new("b.jpg")).await.unwrap();
        let event_id = db.insert_event(&sample_event("游行")).await.unwrap();
        db.link_article_to_event(article_id, event_id).await.unwrap();
        db.link_article_to_event(other_id, event_id).await.unwrap();

        db.delete_article(article_id).await.unwrap();

        assert!(db.get_article(article_id).await.unwrap().is_none());
        let remaining = db.articles_for_event(event_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, Some(other_id));
    }

    #[tokio::test]
    async fn delete_event_removes_its_links() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let article_id = db.insert_article(&Article::new("a.jpg")).await.unwrap();
        let event_id = db.insert_event(&sample_event("庙会")).await.unwrap();
        db.link_article_to_event(article_id, event_id).await.unwrap();

        db.delete_event(event_id).await.unwrap();

        assert!(db.get_event(event_id).await.unwrap().is_none());
        assert_eq!(db.count_links().await.unwrap(), 0);
        assert!(db.get_article(article_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mutations_publish_change_feed() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;
        let mut rx = db.subscribe();

        db.insert_article(&Article::new("a.jpg")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreChange::Articles);

        db.insert_event(&sample_event("集会")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreChange::Events);
    }

    #[tokio::test]
    async fn events_ordered_by_event_date() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir).await;

        let mut early = sample_event("早");
        early.event_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut late = sample_event("晚");
        late.event_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        db.insert_event(&early).await.unwrap();
        db.insert_event(&late).await.unwrap();

        let events = db.list_events().await.unwrap();
        assert_eq!(events[0].title, "晚");
        assert_eq!(events[1].title, "早");
    }
}
