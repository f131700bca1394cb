//! Verse-anchored chat companion.
//!
//! A session is pinned to one verse and keeps the running transcript. Each
//! send posts the message plus a trailing window of the transcript, so the
//! companion stays on topic without the request body growing unbounded.

use crate::client::http::generation_client;
use crate::config::EngineConfig;
use crate::types::VerseRef;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const CHAT_PATH: &str = "/api/chat";
/// How many trailing turns accompany each message.
const HISTORY_WINDOW: usize = 6;
/// Shown when the companion endpoint fails; the session stays usable.
pub const FALLBACK_REPLY: &str =
    "I apologize, but I had trouble responding. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Speaker,
    pub text: String,
}

/// A conversation about one verse.
pub struct ChatSession {
    base_url: String,
    verse: VerseRef,
    turns: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

impl ChatSession {
    pub fn new(config: &EngineConfig, verse: VerseRef) -> Self {
        Self {
            base_url: config.base_url.clone(),
            verse,
            turns: Vec::new(),
        }
    }

    pub fn verse(&self) -> &VerseRef {
        &self.verse
    }

    /// The full transcript, oldest first.
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Send a message and record both sides of the exchange. Endpoint
    /// failures resolve to [`FALLBACK_REPLY`] rather than an error, so the
    /// transcript never loses the user's message.
    pub async fn send(&mut self, message: &str) -> String {
        let request = self.build_request(message);
        self.turns.push(ChatTurn {
            sender: Speaker::User,
            text: message.to_string(),
        });

        let reply = match self.post(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("[Chat] companion request failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        self.turns.push(ChatTurn {
            sender: Speaker::Assistant,
            text: reply.clone(),
        });
        reply
    }

    async fn post(&self, request: &Value) -> Result<String, reqwest::Error> {
        let response = generation_client()
            .post(format!("{}{}", self.base_url, CHAT_PATH))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.response)
    }

    fn build_request(&self, message: &str) -> Value {
        let start = self.turns.len().saturating_sub(HISTORY_WINDOW);
        json!({
            "message": message,
            "verseReference": self.verse.reference,
            "verseText": self.verse.text,
            "source": self.verse.source,
            "history": &self.turns[start..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChatSession {
        ChatSession::new(
            &EngineConfig::new("http://localhost:3000"),
            VerseRef {
                reference: "Devarim 6:4".to_string(),
                version: "Hebrew Bible".to_string(),
                text: "Hear, O Israel".to_string(),
                source: Some("Torah".to_string()),
            },
        )
    }

    fn push_exchange(session: &mut ChatSession, n: usize) {
        for i in 0..n {
            session.turns.push(ChatTurn {
                sender: Speaker::User,
                text: format!("question {}", i),
            });
            session.turns.push(ChatTurn {
                sender: Speaker::Assistant,
                text: format!("answer {}", i),
            });
        }
    }

    #[test]
    fn test_request_carries_verse_and_history() {
        let mut session = session();
        push_exchange(&mut session, 1);

        let request = session.build_request("What does 'hear' mean here?");
        assert_eq!(request["verseReference"], "Devarim 6:4");
        assert_eq!(request["source"], "Torah");
        assert_eq!(request["message"], "What does 'hear' mean here?");
        assert_eq!(request["history"].as_array().unwrap().len(), 2);
        assert_eq!(request["history"][0]["sender"], "user");
    }

    #[test]
    fn test_history_window_keeps_last_six_turns() {
        let mut session = session();
        push_exchange(&mut session, 10);

        let request = session.build_request("another question");
        let history = request["history"].as_array().unwrap();
        assert_eq!(history.len(), HISTORY_WINDOW);
        // The window is the tail of the transcript
        assert_eq!(history[0]["text"], "question 7");
        assert_eq!(history[5]["text"], "answer 9");
    }
}
