//! Image generation. Failures here are absorbed: content renders fine
//! without its illustrations.

use super::http::image_client;
use super::{HttpBackend, ImageRequest};
use serde_json::{json, Value};

const IMAGE_PATH: &str = "/api/generate-image";

impl HttpBackend {
    pub(crate) async fn fetch_image(&self, request: ImageRequest) -> Option<String> {
        let body = json!({
            "prompt": request.prompt,
            "width": request.width,
            "height": request.height,
            "ageRange": request.age_hint,
        });

        let response = match image_client()
            .post(self.url(IMAGE_PATH))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("[Image] request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("[Image] provider returned {}", response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => value
                .get("imageUrl")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            Err(e) => {
                tracing::warn!("[Image] unreadable response: {}", e);
                None
            }
        }
    }
}
