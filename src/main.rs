use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use clipbot::ai::GeminiClient;
use clipbot::config::AppConfig;
use clipbot::drive::{DriveClient, RemoteStore};
use clipbot::ocr::TesseractOcr;
use clipbot::storage::{Article, Database, Event, OcrStatus};
use clipbot::utils::{html_escape, logger, make_thumbnail, truncate_chars};
use clipbot::workflow::{ArticleWorkflow, EventWorkflow};

#[derive(Parser)]
#[command(name = "clipbot")]
#[command(about = "报刊剪报OCR识别与事件时间线工具", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化配置和数据库
    Init,
    /// 登记一张剪报照片
    Import {
        /// 图片路径
        image: String,
        /// 报纸名称
        #[arg(short, long)]
        newspaper: Option<String>,
        /// 见报日期 (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
        /// 标记为活动邀请
        #[arg(long)]
        invitation: bool,
        /// 备注
        #[arg(long)]
        notes: Option<String>,
    },
    /// 对文章执行OCR识别并做AI补充信息
    Ocr {
        /// 指定文章ID；缺省批量处理全部待识别文章
        #[arg(long)]
        id: Option<i64>,
    },
    /// 上传文章图片到云端备份
    Upload {
        #[arg(long)]
        id: i64,
    },
    /// 从云端备份下载文章图片
    Restore {
        #[arg(long)]
        id: i64,
        /// 保存路径
        #[arg(short, long)]
        output: String,
    },
    /// 列出文章
    List {
        /// 按OCR状态过滤 (pending/processing/completed/failed)
        #[arg(long)]
        status: Option<String>,
        /// 只显示活动邀请
        #[arg(long)]
        invitations: bool,
    },
    /// 按OCR文本搜索文章
    Search {
        /// 搜索关键词
        query: String,
    },
    /// 批量分析文章并创建事件
    Analyze {
        /// 文章ID列表；缺省分析全部已识别文章
        ids: Vec<i64>,
    },
    /// 为事件生成叙事综述
    Summary {
        #[arg(long)]
        event: i64,
    },
    /// 关联文章与事件
    Link {
        #[arg(long)]
        article: i64,
        #[arg(long)]
        event: i64,
        /// 取消关联
        #[arg(long)]
        remove: bool,
    },
    /// 生成事件时间线HTML报告
    Timeline {
        /// 输出路径，缺省写入 data/reports/
        #[arg(short, long)]
        output: Option<String>,
    },
    /// 删除文章或事件（连带清理关联）
    Delete {
        #[arg(long)]
        article: Option<i64>,
        #[arg(long)]
        event: Option<i64>,
    },
    /// 清理所有数据
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init_logger();
    info!("clipbot 启动");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init_command().await?,
        Commands::Import { image, newspaper, date, invitation, notes } => {
            import_command(image, newspaper, date, invitation, notes).await?;
        }
        Commands::Ocr { id } => ocr_command(id).await?,
        Commands::Upload { id } => upload_command(id).await?,
        Commands::Restore { id, output } => restore_command(id, output).await?,
        Commands::List { status, invitations } => list_command(status, invitations).await?,
        Commands::Search { query } => search_command(query).await?,
        Commands::Analyze { ids } => analyze_command(ids).await?,
        Commands::Summary { event } => summary_command(event).await?,
        Commands::Link { article, event, remove } => link_command(article, event, remove).await?,
        Commands::Timeline { output } => timeline_command(output).await?,
        Commands::Delete { article, event } => delete_command(article, event).await?,
        Commands::Clean => clean_command().await?,
    }

    Ok(())
}

async fn open_database(config: &AppConfig) -> Result<Arc<Database>> {
    let db = Database::new(&format!("sqlite:{}", config.storage.database_path)).await?;
    Ok(Arc::new(db))
}

fn build_article_workflow(config: &AppConfig, db: Arc<Database>) -> ArticleWorkflow {
    ArticleWorkflow::new(
        db,
        Arc::new(TesseractOcr::new(config.ocr.clone())),
        Arc::new(GeminiClient::new(config.ai.clone())),
        Arc::new(DriveClient::new(config.drive.clone())),
    )
}

fn build_event_workflow(config: &AppConfig, db: Arc<Database>) -> EventWorkflow {
    EventWorkflow::new(db, Arc::new(GeminiClient::new(config.ai.clone())))
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    // 创建必要的目录
    tokio::fs::create_dir_all("data/images").await?;
    tokio::fs::create_dir_all("data/thumbs").await?;
    tokio::fs::create_dir_all("data/reports").await?;
    tokio::fs::create_dir_all("config").await?;

    // 生成默认配置文件
    let config = AppConfig::default();
    config.save("config/settings.toml")?;
    info!("已生成配置文件: config/settings.toml");

    // 初始化数据库（确保data目录已创建）
    let db = open_database(&config).await?;
    db.init_schema().await?;
    info!("数据库初始化完成");

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 编辑 config/settings.toml 配置Gemini API密钥与Drive访问令牌");
    info!("  2. 安装 tesseract 及 eng/urd/tel 语言包");
    info!("  3. 运行 'clipbot import <图片>' 登记剪报");

    Ok(())
}

async fn import_command(
    image: String,
    newspaper: Option<String>,
    date: Option<String>,
    invitation: bool,
    notes: Option<String>,
) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;
    db.init_schema().await?;

    if !std::path::Path::new(&image).exists() {
        bail!("图片文件不存在: {}", image);
    }

    let publication_date = match date {
        Some(ref s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => bail!("见报日期格式应为 YYYY-MM-DD: {}", s),
        },
        None => None,
    };

    let mut article = Article::new(&image);
    article.newspaper_name = newspaper;
    article.publication_date = publication_date;
    article.is_event_invitation = invitation;
    article.notes = notes;

    // 整图解码较慢，放阻塞线程池，不卡运行时
    let image_for_thumb = image.clone();
    let thumbs_dir = config.storage.thumbs_dir.clone();
    article.thumbnail_path =
        tokio::task::spawn_blocking(move || make_thumbnail(&image_for_thumb, &thumbs_dir)).await?;

    let article_id = db.insert_article(&article).await?;
    info!("✅ 剪报已登记，文章ID: {}", article_id);
    info!("运行 'clipbot ocr --id {}' 开始识别", article_id);

    Ok(())
}

async fn ocr_command(article_id: Option<i64>) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;
    let workflow = build_article_workflow(&config, db.clone());

    if !config.ai.is_configured() {
        info!("⚠️ Gemini API key 未配置，将跳过AI补充信息。可在 config/settings.toml 中设置");
    }

    let articles = match article_id {
        Some(id) => {
            vec![db.get_article(id).await?.ok_or_else(|| anyhow::anyhow!("文章不存在: id={}", id))?]
        }
        None => db.list_articles_by_status(OcrStatus::Pending).await?,
    };

    if articles.is_empty() {
        info!("没有待识别的文章");
        return Ok(());
    }

    info!("找到 {} 篇待识别文章", articles.len());

    let mut success_count = 0;
    let mut fail_count = 0;

    for article in &articles {
        let id = article.id.unwrap_or_default();
        info!("识别: 文章{} ({})", id, article.image_path);
        match workflow.process(id).await {
            Ok(text) => {
                info!("  ✅ {}", truncate_chars(&text, 80));
                success_count += 1;
            }
            Err(e) => {
                info!("  ❌ 识别失败: {}", e);
                fail_count += 1;
            }
        }
    }

    info!("✅ OCR完成: {} 成功, {} 失败", success_count, fail_count);
    Ok(())
}

async fn upload_command(article_id: i64) -> Result<()> {
    let config = AppConfig::load()?;

    if !config.drive.is_configured() {
        info!("❌ Drive访问令牌未配置。请在 config/settings.toml 中设置 [drive] access_token");
        return Ok(());
    }

    let db = open_database(&config).await?;
    let workflow = build_article_workflow(&config, db);

    let file_id = workflow.upload(article_id).await?;
    info!("✅ 备份完成，远端文件ID: {}", file_id);
    Ok(())
}

async fn restore_command(article_id: i64, output: String) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;

    let article = db
        .get_article(article_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("文章不存在: id={}", article_id))?;
    let Some(file_id) = article.drive_file_id else {
        bail!("文章{}没有云端备份，请先运行 upload", article_id);
    };

    let drive = DriveClient::new(config.drive.clone());
    drive.download(&file_id, &output).await?;
    info!("✅ 已下载到: {}", output);
    Ok(())
}

async fn list_command(status: Option<String>, invitations: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;

    let articles = if invitations {
        if status.is_some() {
            bail!("--invitations 与 --status 不能同时使用");
        }
        db.list_event_invitations().await?
    } else {
        match status {
            Some(ref s) => {
                let status: OcrStatus = s.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                db.list_articles_by_status(status).await?
            }
            None => db.list_articles().await?,
        }
    };

    if articles.is_empty() {
        info!("没有文章");
        return Ok(());
    }

    print_articles(&articles);
    info!("共 {} 篇文章", articles.len());
    Ok(())
}

async fn search_command(query: String) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;

    let articles = db.search_articles(&query).await?;
    if articles.is_empty() {
        info!("没有匹配 \"{}\" 的文章", query);
        return Ok(());
    }

    print_articles(&articles);
    info!("共 {} 篇文章匹配 \"{}\"", articles.len(), query);
    Ok(())
}

fn print_articles(articles: &[Article]) {
    for article in articles {
        let date = article
            .publication_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        info!(
            "#{} [{:?}] {} {} 文本{}字",
            article.id.unwrap_or_default(),
            article.ocr_status,
            date,
            article.newspaper_name.as_deref().unwrap_or("(未知报纸)"),
            article.ocr_text.as_deref().map(|t| t.chars().count()).unwrap_or(0),
        );
    }
}

async fn analyze_command(ids: Vec<i64>) -> Result<()> {
    let config = AppConfig::load()?;

    if !config.ai.is_configured() {
        info!("❌ Gemini API key 未配置。请在 config/settings.toml 中设置 [ai] api_key");
        return Ok(());
    }

    let db = open_database(&config).await?;
    let workflow = build_event_workflow(&config, db.clone());

    let articles = if ids.is_empty() {
        db.list_articles_by_status(OcrStatus::Completed).await?
    } else {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let article = db
                .get_article(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("文章不存在: id={}", id))?;
            selected.push(article);
        }
        selected
    };

    if articles.is_empty() {
        info!("没有已完成OCR的文章，请先运行 'clipbot ocr'");
        return Ok(());
    }

    info!("开始批量分析 {} 篇文章...", articles.len());
    let events = workflow.analyze_and_create_events(&articles).await?;

    for event in &events {
        let date = event
            .event_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "日期未知".to_string());
        info!(
            "  事件#{} [{}] {}",
            event.id.unwrap_or_default(),
            date,
            event.title
        );
    }

    info!("✅ 分析完成，创建了 {} 个事件", events.len());
    Ok(())
}

async fn summary_command(event_id: i64) -> Result<()> {
    let config = AppConfig::load()?;

    if !config.ai.is_configured() {
        info!("❌ Gemini API key 未配置。请在 config/settings.toml 中设置 [ai] api_key");
        return Ok(());
    }

    let db = open_database(&config).await?;
    let workflow = build_event_workflow(&config, db.clone());

    let articles = db.articles_for_event(event_id).await?;
    if articles.is_empty() {
        info!("⚠️ 事件{}没有关联文章，综述将只依据事件本身的信息", event_id);
    }

    let summary = workflow.generate_event_summary(event_id, &articles).await?;
    info!("✅ 综述已生成:");
    info!("{}", summary);
    Ok(())
}

async fn link_command(article_id: i64, event_id: i64, remove: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;
    let workflow = build_event_workflow(&config, db);

    if remove {
        workflow.unlink_article(article_id, event_id).await?;
        info!("✅ 已取消文章{}与事件{}的关联", article_id, event_id);
    } else {
        workflow.link_article(article_id, event_id).await?;
        info!("✅ 已关联文章{}与事件{}", article_id, event_id);
    }
    Ok(())
}

async fn timeline_command(output: Option<String>) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;

    let events = db.list_events().await?;
    if events.is_empty() {
        info!("还没有事件，请先运行 'clipbot analyze'");
        return Ok(());
    }

    let mut timeline = Vec::with_capacity(events.len());
    for event in events {
        let articles = db.articles_for_event(event.id.unwrap_or_default()).await?;
        timeline.push((event, articles));
    }

    let html = generate_timeline_html(&timeline);
    let output_path = output.unwrap_or_else(|| {
        format!(
            "{}/timeline_{}.html",
            config.storage.reports_dir,
            chrono::Local::now().format("%Y-%m-%d")
        )
    });
    tokio::fs::create_dir_all(&config.storage.reports_dir).await?;
    tokio::fs::write(&output_path, html).await?;

    info!("✅ 时间线已生成: {}", output_path);
    Ok(())
}

async fn delete_command(article_id: Option<i64>, event_id: Option<i64>) -> Result<()> {
    let config = AppConfig::load()?;
    let db = open_database(&config).await?;

    match (article_id, event_id) {
        (Some(id), None) => {
            let workflow = build_article_workflow(&config, db);
            workflow.delete(id).await?;
            info!("✅ 文章{}及其关联已删除", id);
        }
        (None, Some(id)) => {
            let workflow = build_event_workflow(&config, db);
            workflow.delete(id).await?;
            info!("✅ 事件{}及其关联已删除", id);
        }
        _ => bail!("请用 --article <ID> 或 --event <ID> 指定要删除的对象"),
    }
    Ok(())
}

async fn clean_command() -> Result<()> {
    info!("开始清理数据...");

    let config = AppConfig::load()?;
    let mut total_files = 0u64;

    // 清理 data/ 下的三个子目录
    for dir in &[
        config.storage.images_dir.as_str(),
        config.storage.thumbs_dir.as_str(),
        config.storage.reports_dir.as_str(),
    ] {
        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => {
                let mut count = 0u64;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.is_file() {
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            info!("删除失败 {}: {}", path.display(), e);
                        } else {
                            count += 1;
                        }
                    }
                }
                info!("已清理 {}: {} 个文件", dir, count);
                total_files += count;
            }
            Err(_) => {
                info!("目录不存在，跳过: {}", dir);
            }
        }
    }

    // 清空数据库表
    match open_database(&config).await {
        Ok(db) => {
            db.clear_all_tables().await?;
        }
        Err(e) => {
            info!("数据库连接失败，跳过清空: {}", e);
        }
    }

    info!("✅ 清理完成，共删除 {} 个文件", total_files);
    Ok(())
}

fn generate_timeline_html(timeline: &[(Event, Vec<Article>)]) -> String {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>剪报事件时间线 - {date}</title>
<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{ font-family: -apple-system, "Segoe UI", Roboto, "Noto Sans", sans-serif; background: #f5f5f5; color: #333; line-height: 1.6; }}
.container {{ max-width: 900px; margin: 0 auto; padding: 20px; }}
header {{ background: linear-gradient(135deg, #4e342e 0%, #6d4c41 100%); color: white; padding: 40px 30px; border-radius: 12px; margin-bottom: 30px; }}
header h1 {{ font-size: 28px; margin-bottom: 8px; }}
header .meta {{ opacity: 0.85; font-size: 14px; }}
.event {{ background: white; border-radius: 12px; padding: 28px; margin-bottom: 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); border-left: 5px solid #8d6e63; }}
.event-title {{ font-size: 22px; color: #4e342e; margin-bottom: 8px; }}
.event-meta {{ display: flex; gap: 12px; flex-wrap: wrap; margin-bottom: 14px; }}
.badge {{ background: #efebe9; color: #5d4037; padding: 4px 12px; border-radius: 12px; font-size: 13px; }}
.badge.ai {{ background: #e8eaf6; color: #3949ab; }}
.description {{ color: #555; margin-bottom: 12px; }}
.summary {{ background: #fff8e1; border-left: 3px solid #ffb300; padding: 12px 16px; margin: 12px 0; border-radius: 0 8px 8px 0; font-size: 14px; }}
.summary-label {{ font-size: 12px; color: #ff8f00; margin-bottom: 4px; font-weight: 600; }}
h3 {{ font-size: 15px; color: #6d4c41; margin: 16px 0 8px 0; }}
.article {{ background: #fafafa; border-radius: 8px; padding: 12px 16px; margin-bottom: 8px; display: flex; gap: 14px; }}
.article img {{ width: 72px; height: 72px; object-fit: cover; border-radius: 6px; }}
.article .source {{ font-weight: 600; color: #37474f; font-size: 14px; }}
.article .preview {{ font-size: 13px; color: #666; word-break: break-word; }}
.empty {{ color: #999; font-style: italic; padding: 8px; }}
</style>
</head>
<body>
<div class="container">
<header>
  <h1>剪报事件时间线</h1>
  <div class="meta">生成日期: {date} &nbsp;|&nbsp; 事件数: {count}</div>
</header>
"#,
        date = date,
        count = timeline.len()
    );

    for (event, articles) in timeline {
        let event_date = event
            .event_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "日期未知".to_string());

        html.push_str(&format!(
            r#"<div class="event">
<div class="event-title">{title}</div>
<div class="event-meta">
  <span class="badge">{date}</span>
"#,
            title = html_escape(&event.title),
            date = event_date,
        ));

        if let Some(ref category) = event.category {
            html.push_str(&format!(r#"  <span class="badge">{}</span>"#, html_escape(category)));
            html.push('\n');
        }
        if let Some(ref location) = event.location {
            html.push_str(&format!(r#"  <span class="badge">{}</span>"#, html_escape(location)));
            html.push('\n');
        }
        if event.ai_generated {
            html.push_str(r#"  <span class="badge ai">AI生成</span>"#);
            html.push('\n');
        }
        html.push_str("</div>\n");

        if let Some(ref description) = event.description {
            html.push_str(&format!(
                r#"<div class="description">{}</div>"#,
                html_escape(description)
            ));
            html.push('\n');
        }
        if let Some(ref persons) = event.key_persons {
            html.push_str(&format!(
                r#"<div class="description">相关人物: {}</div>"#,
                html_escape(persons)
            ));
            html.push('\n');
        }

        if let Some(ref summary) = event.summary {
            html.push_str(&format!(
                r#"<div class="summary"><div class="summary-label">AI综述</div>{}</div>"#,
                html_escape(summary)
            ));
            html.push('\n');
        }

        if articles.is_empty() {
            html.push_str(r#"<div class="empty">暂无关联文章</div>"#);
            html.push('\n');
        } else {
            html.push_str(&format!("<h3>相关报道 ({})</h3>\n", articles.len()));
            for article in articles {
                let source = format!(
                    "{} {}",
                    article.newspaper_name.as_deref().unwrap_or("未知报纸"),
                    article
                        .publication_date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                );
                let preview = article
                    .ocr_text
                    .as_deref()
                    .map(|t| truncate_chars(t, 160).to_string())
                    .unwrap_or_else(|| "(尚未识别)".to_string());

                html.push_str(r#"<div class="article">"#);
                if let Some(ref thumb) = article.thumbnail_path {
                    // 报告在 data/reports/ 下，缩略图在 data/thumbs/ 下
                    let src = thumb.strip_prefix("data/").map(|p| format!("../{}", p)).unwrap_or_else(|| thumb.clone());
                    html.push_str(&format!(r#"<img src="{}" loading="lazy">"#, html_escape(&src)));
                }
                html.push_str(&format!(
                    r#"<div><div class="source">{source}</div><div class="preview">{preview}</div></div></div>"#,
                    source = html_escape(&source),
                    preview = html_escape(&preview),
                ));
                html.push('\n');
            }
        }

        html.push_str("</div>\n"); // close .event
    }

    html.push_str("</div>\n</body>\n</html>");
    html
}
