use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::config::OcrConfig;
use crate::utils::{ClipError, ClipResult};

/// 文字识别协作方，离线可用，单次调用同步返回
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image_path: &str) -> ClipResult<String>;
}

/// 调用本机 tesseract 完成识别。乌尔都语/泰卢固语需要安装对应语言包
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn recognize(&self, image_path: &str) -> ClipResult<String> {
        if !Path::new(image_path).exists() {
            return Err(ClipError::Ocr(format!("图片文件不存在: {}", image_path)));
        }

        // 先校验图片头可解码，损坏文件不交给tesseract
        image::image_dimensions(image_path)
            .map_err(|e| ClipError::Ocr(format!("图片解码失败: {}", e)))?;

        let output = Command::new(&self.config.tesseract_path)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.languages)
            .output()
            .await
            .map_err(|e| ClipError::Ocr(format!("无法启动tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipError::Ocr(format!("tesseract退出异常: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("OCR完成，文本长度: {}", text.len());

        if text.is_empty() {
            return Err(ClipError::Ocr("图片中未识别到文字".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ocr() -> TesseractOcr {
        TesseractOcr::new(OcrConfig {
            tesseract_path: "tesseract".to_string(),
            languages: "eng".to_string(),
        })
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let err = ocr().recognize("/no/such/image.jpg").await.unwrap_err();
        assert!(matches!(err, ClipError::Ocr(_)));
    }

    #[tokio::test]
    async fn undecodable_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"this is not a jpeg").unwrap();

        let err = ocr().recognize(path.to_str().unwrap()).await.unwrap_err();
        match err {
            ClipError::Ocr(msg) => assert!(msg.contains("解码失败")),
            other => panic!("意外的错误类型: {:?}", other),
        }
    }
}
