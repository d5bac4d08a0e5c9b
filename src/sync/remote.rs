//! HTTP client for the remote document resource.

use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use serde_json::Value;

use crate::errors::AppError;

/// Which endpoint accepted an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    /// Replace-in-place PUT on the document resource
    Primary,
    /// POST to the secondary save endpoint
    Fallback,
}

/// Client for the single shared remote document.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    document_url: String,
    save_url: Option<String>,
}

impl RemoteClient {
    pub fn new(
        document_url: impl Into<String>,
        save_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            document_url: document_url.into(),
            save_url,
        })
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    /// Fetch the remote document, bypassing caches.
    pub async fn fetch(&self) -> Result<Value, AppError> {
        let resp = self
            .http
            .get(&self.document_url)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Transport(format!(
                "Fetch of {} returned {}",
                self.document_url, status
            )));
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Write the full document: PUT in place first, then POST to the save endpoint.
    pub async fn upload(&self, payload: &str) -> Result<UploadTarget, AppError> {
        let primary = match self.send_put(payload).await {
            Ok(()) => {
                tracing::info!("Replaced {} with PUT", self.document_url);
                return Ok(UploadTarget::Primary);
            }
            Err(e) => e,
        };
        tracing::debug!("PUT rejected, trying save endpoint: {}", primary);

        let Some(save_url) = &self.save_url else {
            return Err(AppError::Transport(format!(
                "Upload failed: {}",
                primary.message()
            )));
        };

        match self.send_post(save_url, payload).await {
            Ok(()) => {
                tracing::info!("Uploaded document to {}", save_url);
                Ok(UploadTarget::Fallback)
            }
            Err(fallback) => Err(AppError::Transport(format!(
                "Upload failed: {}; {}",
                primary.message(),
                fallback.message()
            ))),
        }
    }

    async fn send_put(&self, payload: &str) -> Result<(), AppError> {
        let resp = self
            .http
            .put(&self.document_url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        accepted("PUT", &self.document_url, resp.status())
    }

    async fn send_post(&self, url: &str, payload: &str) -> Result<(), AppError> {
        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        accepted("POST", url, resp.status())
    }
}

fn accepted(method: &str, url: &str, status: reqwest::StatusCode) -> Result<(), AppError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(AppError::Transport(format!(
            "{} {} returned {}",
            method, url, status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_success_status_is_transport_error() {
        let err = accepted("PUT", "http://remote/doc.json", reqwest::StatusCode::FORBIDDEN)
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Transport("PUT http://remote/doc.json returned 403 Forbidden".to_string())
        );
        assert!(accepted("POST", "http://remote/save", reqwest::StatusCode::CREATED).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_remote_without_save_url_fails() {
        let client = RemoteClient::new(
            "http://127.0.0.1:9/silsilah.json",
            None,
            Duration::from_millis(500),
        )
        .unwrap();

        assert!(matches!(
            client.upload("{}").await,
            Err(AppError::Transport(_))
        ));
        assert!(matches!(client.fetch().await, Err(AppError::Transport(_))));
    }
}
