//! HTTP backend for the generation endpoints.

use super::http::generation_client;
use super::{ClientError, ContentBackend, ImageRequest};
use crate::config::EngineConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Named content-generation endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Verse,
    Interpretation,
    Context,
    Story,
    Poem,
    Imagery,
    Songs,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Verse => "verse",
            ContentKind::Interpretation => "interpretation",
            ContentKind::Context => "context",
            ContentKind::Story => "story",
            ContentKind::Poem => "poem",
            ContentKind::Imagery => "imagery",
            ContentKind::Songs => "songs",
        }
    }

    /// Endpoint path, appended to the configured base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ContentKind::Verse => "/api/generate-verse",
            ContentKind::Interpretation => "/api/generate-interpretation",
            ContentKind::Context => "/api/generate-context",
            ContentKind::Story => "/api/generate-story",
            ContentKind::Poem => "/api/generate-poem",
            ContentKind::Imagery => "/api/generate-imagery",
            ContentKind::Songs => "/api/generate-songs",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless HTTP client for the content service.
pub struct HttpBackend {
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ContentBackend for HttpBackend {
    async fn invoke(&self, kind: ContentKind, payload: &Value) -> Result<Value, ClientError> {
        let response = generation_client()
            .post(self.url(kind.path()))
            .json(payload)
            .send()
            .await
            .map_err(|source| ClientError::Transport { kind, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { kind, status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ClientError::Transport { kind, source })?;
        serde_json::from_str(&body).map_err(|source| ClientError::Decode { kind, source })
    }

    async fn generate_image(&self, request: ImageRequest) -> Option<String> {
        self.fetch_image(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(ContentKind::Verse.path(), "/api/generate-verse");
        assert_eq!(ContentKind::Songs.path(), "/api/generate-songs");
        assert_eq!(ContentKind::Interpretation.to_string(), "interpretation");
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let backend = HttpBackend::new(&EngineConfig::new("https://study.example.com/"));
        assert_eq!(
            backend.url(ContentKind::Story.path()),
            "https://study.example.com/api/generate-story"
        );
    }
}
