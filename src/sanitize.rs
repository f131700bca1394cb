//! Cleanup of model-generated text.
//!
//! Generation endpoints are instructed to emit plain prose, but models still
//! leak markdown links, bare URLs, citation brackets, and emphasis markers.
//! `clean_text` strips those; `clean_value` applies the same cleanup
//! recursively over structured results, leaving image-prompt fields alone
//! (those need their formatting for the image provider).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.*?\]\(https?://[^)]+\)").unwrap());
static PAREN_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(https?://[^)]+\)").unwrap());
static BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)\]]+").unwrap());
static DOMAIN_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*(?:\.org|\.com|\.net|\.edu)[^\]]*\]").unwrap());
static WORD_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\w+\]").unwrap());
static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\.").unwrap());
static SPACE_BEFORE_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+,").unwrap());

/// Strip URLs, citations, and markdown emphasis from generated prose and
/// collapse whitespace. Idempotent: a second pass is a no-op.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let out = MARKDOWN_LINK.replace_all(text, "");
    let out = PAREN_URL.replace_all(&out, "");
    let out = BARE_URL.replace_all(&out, "");
    let out = DOMAIN_CITATION.replace_all(&out, "");
    let out = WORD_CITATION.replace_all(&out, "");
    let out = BOLD_STARS.replace_all(&out, "$1");
    let out = ITALIC_STAR.replace_all(&out, "$1");
    let out = BOLD_UNDERSCORES.replace_all(&out, "$1");
    let out = ITALIC_UNDERSCORE.replace_all(&out, "$1");
    let out = WHITESPACE_RUN.replace_all(&out, " ");
    let out = SPACE_BEFORE_PERIOD.replace_all(&out, ".");
    let out = SPACE_BEFORE_COMMA.replace_all(&out, ",");
    out.trim().to_string()
}

/// Whether an object key names an image prompt, which must pass through
/// untouched.
fn is_image_prompt_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("imageprompt") || key.contains("image_prompt")
}

/// Clean every string in a JSON value recursively, exempting image-prompt
/// fields.
pub fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if is_image_prompt_key(&key) {
                        (key, val)
                    } else {
                        (key, clean_value(val))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}
