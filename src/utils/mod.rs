pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("{0}不存在: id={1}")]
    NotFound(&'static str, i64),

    #[error("OCR识别失败: {0}")]
    Ocr(String),

    #[error("云端存储错误: {0}")]
    Drive(String),

    #[error("模型调用失败: {0}")]
    Model(String),

    #[error("模型响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("参数错误: {0}")]
    InvalidInput(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("网络请求错误: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClipResult<T> = Result<T, ClipError>;

/// 按字符数截断文本。乌尔都语/泰卢固语均为多字节编码，不能按字节切片
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 生成缩略图，失败只警告不阻止登记。
/// 整图解码是同步重操作，异步调用方应放进阻塞线程池
pub fn make_thumbnail(image_path: &str, thumbs_dir: &str) -> Option<String> {
    let img = match image::open(image_path) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!("缩略图生成失败，无法打开图片: {}", e);
            return None;
        }
    };

    if let Err(e) = std::fs::create_dir_all(thumbs_dir) {
        tracing::warn!("缩略图目录创建失败: {}", e);
        return None;
    }

    let thumb_path = format!(
        "{}/thumb_{}.jpg",
        thumbs_dir,
        chrono::Utc::now().timestamp_millis()
    );
    let thumb = img.thumbnail(320, 320);
    match thumb.to_rgb8().save(&thumb_path) {
        Ok(_) => Some(thumb_path),
        Err(e) => {
            tracing::warn!("缩略图保存失败: {}", e);
            None
        }
    }
}

/// 转义HTML特殊字符。单双引号都转义，属性值写法变了也安全
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_shorter_text_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        // 泰卢固语每个字符占3字节
        let text = "తెలుగు";
        let cut = truncate_chars(text, 3);
        assert_eq!(cut.chars().count(), 3);
        assert!(text.starts_with(cut));
    }

    #[test]
    fn truncate_empty() {
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn thumbnail_from_valid_image() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("page.png");
        image::RgbImage::new(640, 480).save(&src).unwrap();
        let thumbs_dir = dir.path().join("thumbs");

        let thumb = make_thumbnail(src.to_str().unwrap(), thumbs_dir.to_str().unwrap()).unwrap();
        let (w, h) = image::image_dimensions(&thumb).unwrap();
        assert!(w <= 320 && h <= 320);
    }

    #[test]
    fn thumbnail_from_broken_image_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.jpg");
        std::fs::write(&src, b"this is not a jpeg").unwrap();

        let thumb = make_thumbnail(src.to_str().unwrap(), dir.path().to_str().unwrap());
        assert!(thumb.is_none());
    }

    #[test]
    fn escape_covers_both_quote_styles() {
        assert_eq!(
            html_escape(r#"<a b="c" d='e'>&"#),
            "&lt;a b=&quot;c&quot; d=&#39;e&#39;&gt;&amp;"
        );
        assert_eq!(html_escape("无需转义"), "无需转义");
    }
}
