//! Blob storage for chat attachments.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client as HttpClient, Url};
use serde::Deserialize;
use tracing::info;

use crate::error::{RemoteError, Result};

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store `data` at `path` and return a URL from which it can be fetched.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String>;
}

/// Object metadata returned by an upload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    download_tokens: Option<String>,
}

pub struct StorageClient {
    http: HttpClient,
    base_url: String,
    bucket: String,
}

impl StorageClient {
    pub fn new(base_url: &str, bucket: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    fn objects_url(&self) -> String {
        format!("{}/b/{}/o", self.base_url, self.bucket)
    }

    /// `{base}/b/{bucket}/o/{name}?alt=media&token={token}` with the object
    /// name percent-encoded as a single path segment.
    fn download_url(&self, name: &str, token: Option<&str>) -> Result<String> {
        let mut url =
            Url::parse(&self.objects_url()).map_err(|e| RemoteError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Url(format!("cannot-be-a-base URL: {}", self.base_url)))?
            .push(name);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url.into())
    }
}

#[async_trait]
impl BlobBackend for StorageClient {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String> {
        let size = data.len();
        let resp = self
            .http
            .post(self.objects_url())
            .query(&[("uploadType", "media"), ("name", path)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RemoteError::from_response(status.as_u16(), &body));
        }

        let meta: ObjectMetadata = serde_json::from_str(&body)?;
        let url = self.download_url(&meta.name, meta.download_tokens.as_deref())?;
        info!(path, size, "attachment uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_encodes_name() {
        let client = StorageClient::new("https://storage.example.com/v0/", "bucket.appspot.com");
        let url = client
            .download_url("uploads/plan 1.pdf", Some("tok"))
            .unwrap();
        assert_eq!(
            url,
            "https://storage.example.com/v0/b/bucket.appspot.com/o/uploads%2Fplan%201.pdf?alt=media&token=tok"
        );
    }

    #[test]
    fn test_download_url_without_token() {
        let client = StorageClient::new("https://storage.example.com/v0", "b");
        let url = client.download_url("uploads/a.png", None).unwrap();
        assert!(url.ends_with("/o/uploads%2Fa.png?alt=media"));
    }

    #[test]
    fn test_metadata_parse() {
        let meta: ObjectMetadata =
            serde_json::from_str(r#"{"name":"uploads/a.png","downloadTokens":"t1","bucket":"b"}"#)
                .unwrap();
        assert_eq!(meta.name, "uploads/a.png");
        assert_eq!(meta.download_tokens.as_deref(), Some("t1"));
    }
}
