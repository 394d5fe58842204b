use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::DriveConfig;
use crate::utils::{ClipError, ClipResult};

/// 对象存储协作方。上传前必须已经持有有效的访问令牌
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 上传本地文件，返回远端文件ID
    async fn upload(&self, local_path: &str, name: &str) -> ClipResult<String>;
    /// 按远端ID下载到本地路径
    async fn download(&self, file_id: &str, dest_path: &str) -> ClipResult<()>;
    /// 删除远端文件
    async fn delete(&self, file_id: &str) -> ClipResult<()>;
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

/// Google Drive v3 REST 客户端
pub struct DriveClient {
    client: reqwest::Client,
    config: DriveConfig,
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    fn token(&self) -> ClipResult<&str> {
        if self.config.access_token.is_empty() {
            return Err(ClipError::Drive(
                "未配置访问令牌，请先完成Google登录并写入config/settings.toml".to_string(),
            ));
        }
        Ok(&self.config.access_token)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn upload(&self, local_path: &str, name: &str) -> ClipResult<String> {
        let token = self.token()?;
        let bytes = tokio::fs::read(local_path).await?;

        // media上传不带元数据，拿到ID后再补写文件名
        let upload_url = format!("{}/files?uploadType=media", self.config.upload_url);
        let response = self
            .client
            .post(&upload_url)
            .bearer_auth(token)
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::Drive(format!("上传失败 {}: {}", status, body)));
        }
        let file: DriveFile = response.json().await?;

        let patch_url = format!("{}/files/{}", self.config.api_url, file.id);
        let response = self
            .client
            .patch(&patch_url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::Drive(format!("重命名失败 {}: {}", status, body)));
        }

        info!("文件已上传: {} (ID: {})", name, file.id);
        Ok(file.id)
    }

    async fn download(&self, file_id: &str, dest_path: &str) -> ClipResult<()> {
        let token = self.token()?;
        let url = format!("{}/files/{}?alt=media", self.config.api_url, file_id);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::Drive(format!("下载失败 {}: {}", status, body)));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest_path, &bytes).await?;
        info!("文件已下载: {} -> {}", file_id, dest_path);
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> ClipResult<()> {
        let token = self.token()?;
        let url = format!("{}/files/{}", self.config.api_url, file_id);
        let response = self.client.delete(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipError::Drive(format!("删除失败 {}: {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_without_token_fails_fast() {
        let client = DriveClient::new(DriveConfig {
            access_token: String::new(),
            api_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
        });

        let err = client.upload("a.jpg", "article_1.jpg").await.unwrap_err();
        assert!(matches!(err, ClipError::Drive(_)));
    }
}
