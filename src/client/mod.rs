//! Clients for the content-generation endpoints.
//!
//! [`ContentBackend`] is the seam between the orchestration engine and the
//! network: the engine only ever talks to the trait, so tests swap in mock
//! backends with controlled latency and failures.

mod generation;
pub(crate) mod http;
mod image;

pub use generation::{ContentKind, HttpBackend};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure from a generation endpoint. The caller decides fallback; nothing
/// here is retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {kind} endpoint failed: {source}")]
    Transport {
        kind: ContentKind,
        #[source]
        source: reqwest::Error,
    },
    #[error("{kind} endpoint returned {status}: {body}")]
    Status {
        kind: ContentKind,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid JSON from {kind} endpoint: {source}")]
    Decode {
        kind: ContentKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Parameters for one image-generation call.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    /// Forwarded so the provider can restyle images for younger audiences.
    pub age_hint: String,
}

impl ImageRequest {
    /// 1024x768 banner image (interpretation and context heroes).
    pub fn hero(prompt: impl Into<String>, age_hint: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 1024,
            height: 768,
            age_hint: age_hint.into(),
        }
    }

    /// 512x512 card image (stories, poetry, imagery, songs).
    pub fn card(prompt: impl Into<String>, age_hint: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 512,
            height: 512,
            age_hint: age_hint.into(),
        }
    }
}

/// The generation service as the engine sees it.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// POST `payload` to the endpoint for `kind` and return its JSON body.
    /// Non-2xx responses and transport errors are typed failures; there are
    /// no retries and no timeout beyond the transport default.
    async fn invoke(&self, kind: ContentKind, payload: &Value) -> Result<Value, ClientError>;

    /// Request one image. Never a hard failure: any error resolves to `None`
    /// because a missing illustration must not block or fail the content
    /// around it.
    async fn generate_image(&self, request: ImageRequest) -> Option<String>;
}
