//! Attachment upload pipeline
//!
//! Bounded-retry, timeout-guarded uploads for steps that collect
//! evidence. MIME validation happens before any network transfer and a
//! rejected type does not consume a retry; transfer failures do. The
//! retry count lives in the flow's scratch data because each retry is
//! driven by the user re-sending the attachment, not an internal loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// MIME types a step may accept as evidence.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "application/pdf",
];

/// Retries after the first failed attempt (2 retries ⇒ 3 total attempts).
pub const MAX_UPLOAD_RETRIES: u64 = 2;

/// Hard per-attempt timeout.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Successful upload outcome. Only `reference` outlives the flow, as a
/// field of the completed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub reference: String,
    pub mime_type: String,
    pub checksum: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported attachment type '{0}'")]
    UnsupportedType(String),

    #[error("attachment payload is not valid base64")]
    BadPayload,

    #[error("upload timed out")]
    TimedOut,

    #[error("attachment store error: {0}")]
    Transfer(String),
}

impl UploadError {
    /// Validation failures are the user's to fix and do not consume a
    /// retry attempt; transfer failures and timeouts do.
    pub fn consumes_retry(&self) -> bool {
        matches!(self, UploadError::TimedOut | UploadError::Transfer(_))
    }
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store bytes under a folder, returning a stable reference.
    async fn store(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        folder: &str,
    ) -> Result<String, UploadError>;
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: Arc<dyn AttachmentStore>,
    timeout: Duration,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn AttachmentStore>) -> Self {
        Self {
            store,
            timeout: UPLOAD_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(store: Arc<dyn AttachmentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Validate and upload one attachment. One network attempt only;
    /// retry bookkeeping belongs to the step handler driving this.
    pub async fn upload(
        &self,
        mime_type: &str,
        data_base64: &str,
        folder: &str,
    ) -> Result<UploadResult, UploadError> {
        let mime = mime_type.trim().to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(UploadError::UnsupportedType(mime));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data_base64)
            .map_err(|_| UploadError::BadPayload)?;

        let checksum = format!("{:x}", Sha256::digest(&bytes));

        let reference =
            match tokio::time::timeout(self.timeout, self.store.store(bytes, &mime, folder)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        component = "upload",
                        event = "upload.timeout",
                        folder = folder,
                        "Attachment upload timed out"
                    );
                    return Err(UploadError::TimedOut);
                }
            };

        Ok(UploadResult {
            reference,
            mime_type: mime,
            checksum,
        })
    }
}

/// HTTP attachment store: PUTs bytes to `{base_url}/{folder}/{id}`.
pub struct HttpAttachmentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAttachmentStore {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        folder: &str,
    ) -> Result<String, UploadError> {
        let reference = format!("{}/{}", folder, sitedesk_protocol::new_id());
        let url = format!("{}/{}", self.base_url, reference);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Transfer(format!(
                "attachment store returned {}",
                response.status()
            )));
        }

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubAttachmentStore;

    const PNG_B64: &str = "aGVsbG8="; // "hello"

    #[tokio::test]
    async fn upload_produces_reference_and_checksum() {
        let store = Arc::new(StubAttachmentStore::default());
        let pipeline = UploadPipeline::new(store.clone());

        let result = pipeline
            .upload("image/png", PNG_B64, "activity")
            .await
            .unwrap();

        assert!(result.reference.starts_with("activity/"));
        assert_eq!(result.mime_type, "image/png");
        // sha256("hello")
        assert_eq!(
            result.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(store.stored_count(), 1);
    }

    #[tokio::test]
    async fn disallowed_mime_is_rejected_before_transfer() {
        let store = Arc::new(StubAttachmentStore::default());
        let pipeline = UploadPipeline::new(store.clone());

        let err = pipeline
            .upload("application/x-msdownload", PNG_B64, "activity")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::UnsupportedType(_)));
        assert!(!err.consumes_retry());
        assert_eq!(store.stored_count(), 0);
    }

    #[tokio::test]
    async fn bad_base64_is_a_validation_failure() {
        let pipeline = UploadPipeline::new(Arc::new(StubAttachmentStore::default()));
        let err = pipeline
            .upload("image/jpeg", "not//valid??", "activity")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::BadPayload));
        assert!(!err.consumes_retry());
    }

    #[tokio::test]
    async fn slow_store_hits_the_timeout() {
        let store = Arc::new(StubAttachmentStore::slow(Duration::from_secs(5)));
        let pipeline = UploadPipeline::with_timeout(store, Duration::from_millis(20));

        let err = pipeline
            .upload("image/png", PNG_B64, "activity")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TimedOut));
        assert!(err.consumes_retry());
    }

    #[tokio::test]
    async fn transfer_failures_consume_a_retry() {
        let store = Arc::new(StubAttachmentStore::failing());
        let pipeline = UploadPipeline::new(store);

        let err = pipeline
            .upload("image/png", PNG_B64, "activity")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Transfer(_)));
        assert!(err.consumes_retry());
    }
}
