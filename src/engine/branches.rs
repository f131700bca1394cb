//! The six content branches.
//!
//! Each branch invokes its endpoint(s), merges the sanitized text into the
//! bundle, drops its loading flag, then walks its image prompts sequentially.
//! A branch failure merges a placeholder (or leaves the slot absent) and the
//! branch still resolves, so no failure ever propagates to a sibling.

use super::state::{CycleToken, SharedState};
use crate::client::{ClientError, ContentBackend, ContentKind, ImageRequest};
use crate::sanitize::{clean_text, clean_value};
use crate::types::{ContextData, ImageryData, PoetryData, SongData, StoryData};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Everything a branch needs: the backend, the merge gate, and the shared
/// request body (verse + profile fields).
pub(crate) struct BranchCtx {
    pub backend: Arc<dyn ContentBackend>,
    pub state: Arc<SharedState>,
    pub token: CycleToken,
    pub payload: Value,
    pub age_hint: String,
}

impl BranchCtx {
    /// The shared payload plus one branch-specific field.
    fn payload_with(&self, key: &str, value: &str) -> Value {
        let mut payload = self.payload.clone();
        if let Some(map) = payload.as_object_mut() {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
        payload
    }

    async fn hero_image(&self, prompt: &str) -> Option<String> {
        self.backend
            .generate_image(ImageRequest::hero(prompt, self.age_hint.clone()))
            .await
    }

    async fn card_image(&self, prompt: &str) -> Option<String> {
        self.backend
            .generate_image(ImageRequest::card(prompt, self.age_hint.clone()))
            .await
    }
}

fn parse_or_default<T: DeserializeOwned + Default>(kind: ContentKind, value: Value) -> T {
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("[Engine] malformed {} response: {}", kind, e);
        T::default()
    })
}

fn nonempty(prompt: Option<String>) -> Option<String> {
    prompt.filter(|p| !p.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterpretationResponse {
    interpretation: Option<String>,
    hero_image_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextResponse {
    context: Option<ContextData>,
    context_image_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PoemResponse {
    poem: Option<PoetryData>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageryResponse {
    #[serde(default)]
    imagery: Vec<ImageryData>,
}

#[derive(Debug, Default, Deserialize)]
struct SongsResponse {
    songs: Option<SongData>,
}

/// The blocking leg of the interpretation branch: the entry point awaits
/// this before returning. Yields the hero-image prompt for the async leg.
pub(crate) async fn interpretation_text(ctx: &BranchCtx) -> Option<String> {
    let prompt = match ctx
        .backend
        .invoke(ContentKind::Interpretation, &ctx.payload)
        .await
    {
        Ok(value) => {
            let parsed: InterpretationResponse =
                parse_or_default(ContentKind::Interpretation, value);
            let interpretation = parsed.interpretation.map(|text| clean_text(&text));
            let prompt = nonempty(parsed.hero_image_prompt);
            ctx.state.merge(ctx.token, |bundle| {
                bundle.interpretation = interpretation.clone();
                bundle.hero_image_prompt = prompt.clone();
            });
            prompt
        }
        Err(e) => {
            tracing::warn!("[Engine] interpretation branch failed: {}", e);
            None
        }
    };
    ctx.state
        .set_loading(ctx.token, |loading| loading.interpretation = false);
    prompt
}

/// The async leg of the interpretation branch.
pub(crate) async fn interpretation_images(ctx: &BranchCtx, hero_prompt: Option<String>) {
    if let Some(prompt) = hero_prompt {
        if let Some(url) = ctx.hero_image(&prompt).await {
            ctx.state
                .merge(ctx.token, |bundle| bundle.hero_image = Some(url.clone()));
        }
    }
}

pub(crate) async fn context(ctx: &BranchCtx) {
    match ctx.backend.invoke(ContentKind::Context, &ctx.payload).await {
        Ok(value) => {
            let parsed: ContextResponse =
                parse_or_default(ContentKind::Context, clean_value(value));
            let prompt = nonempty(parsed.context_image_prompt);
            ctx.state.merge(ctx.token, |bundle| {
                bundle.context = parsed.context.clone();
                bundle.context_image_prompt = prompt.clone();
            });
            ctx.state
                .set_loading(ctx.token, |loading| loading.context = false);

            if let Some(prompt) = prompt {
                if let Some(url) = ctx.hero_image(&prompt).await {
                    ctx.state.merge(ctx.token, |bundle| {
                        bundle.context_hero_image = Some(url.clone())
                    });
                }
            }
        }
        Err(e) => {
            tracing::warn!("[Engine] context branch failed: {}", e);
            ctx.state
                .set_loading(ctx.token, |loading| loading.context = false);
        }
    }
}

fn story_from(result: Result<Value, ClientError>) -> StoryData {
    match result {
        Ok(value) => match serde_json::from_value::<StoryData>(clean_value(value)) {
            Ok(story) if !story.title.is_empty() => story,
            Ok(_) => StoryData::stub(),
            Err(e) => {
                tracing::warn!("[Engine] malformed story response: {}", e);
                StoryData::stub()
            }
        },
        Err(e) => {
            tracing::warn!("[Engine] story call failed: {}", e);
            StoryData::stub()
        }
    }
}

/// Two story calls joined (contemporary + historical), then one image per
/// story, in order.
pub(crate) async fn stories(ctx: &BranchCtx) {
    let contemporary_payload = ctx.payload_with("storyType", "contemporary");
    let historical_payload = ctx.payload_with("storyType", "historical");
    let contemporary = ctx.backend.invoke(ContentKind::Story, &contemporary_payload);
    let historical = ctx.backend.invoke(ContentKind::Story, &historical_payload);
    let (contemporary, historical) = futures::join!(contemporary, historical);

    let stories = vec![story_from(contemporary), story_from(historical)];
    ctx.state
        .merge(ctx.token, |bundle| bundle.stories = stories.clone());
    ctx.state
        .set_loading(ctx.token, |loading| loading.stories = false);

    for (index, story) in stories.iter().enumerate() {
        let Some(prompt) = nonempty(story.image_prompt.clone()) else {
            continue;
        };
        if let Some(url) = ctx.card_image(&prompt).await {
            ctx.state.merge(ctx.token, |bundle| {
                if let Some(slot) = bundle.stories.get_mut(index) {
                    slot.img = Some(url.clone());
                }
            });
        }
    }
}

fn poem_from(result: Result<Value, ClientError>) -> PoetryData {
    match result {
        Ok(value) => {
            let parsed: PoemResponse = parse_or_default(ContentKind::Poem, clean_value(value));
            parsed.poem.unwrap_or_else(PoetryData::stub)
        }
        Err(e) => {
            tracing::warn!("[Engine] poem call failed: {}", e);
            PoetryData::stub()
        }
    }
}

/// Two poem calls joined (classic + free verse), then one image per poem.
pub(crate) async fn poetry(ctx: &BranchCtx) {
    let classic_payload = ctx.payload_with("poemType", "classic");
    let freeverse_payload = ctx.payload_with("poemType", "freeverse");
    let classic = ctx.backend.invoke(ContentKind::Poem, &classic_payload);
    let freeverse = ctx.backend.invoke(ContentKind::Poem, &freeverse_payload);
    let (classic, freeverse) = futures::join!(classic, freeverse);

    let poetry = vec![poem_from(classic), poem_from(freeverse)];
    ctx.state
        .merge(ctx.token, |bundle| bundle.poetry = poetry.clone());
    ctx.state
        .set_loading(ctx.token, |loading| loading.poetry = false);

    for (index, poem) in poetry.iter().enumerate() {
        let Some(prompt) = nonempty(poem.image_prompt.clone()) else {
            continue;
        };
        if let Some(url) = ctx.card_image(&prompt).await {
            ctx.state.merge(ctx.token, |bundle| {
                if let Some(slot) = bundle.poetry.get_mut(index) {
                    slot.img = Some(url.clone());
                }
            });
        }
    }
}

pub(crate) async fn imagery(ctx: &BranchCtx) {
    match ctx.backend.invoke(ContentKind::Imagery, &ctx.payload).await {
        Ok(value) => {
            let parsed: ImageryResponse =
                parse_or_default(ContentKind::Imagery, clean_value(value));
            let items = parsed.imagery;
            ctx.state
                .merge(ctx.token, |bundle| bundle.imagery = items.clone());
            ctx.state
                .set_loading(ctx.token, |loading| loading.imagery = false);

            for (index, item) in items.iter().enumerate() {
                let Some(prompt) = nonempty(item.image_prompt.clone()) else {
                    continue;
                };
                if let Some(url) = ctx.card_image(&prompt).await {
                    ctx.state.merge(ctx.token, |bundle| {
                        if let Some(slot) = bundle.imagery.get_mut(index) {
                            slot.img = Some(url.clone());
                        }
                    });
                }
            }
        }
        Err(e) => {
            tracing::warn!("[Engine] imagery branch failed: {}", e);
            ctx.state
                .set_loading(ctx.token, |loading| loading.imagery = false);
        }
    }
}

/// Songs keep their structure: lyrics carry `[Verse 1]`-style markers and the
/// audio prompt needs its formatting, so only title and subtitle are cleaned.
pub(crate) async fn songs(ctx: &BranchCtx) {
    match ctx.backend.invoke(ContentKind::Songs, &ctx.payload).await {
        Ok(value) => {
            let parsed: SongsResponse = parse_or_default(ContentKind::Songs, value);
            let Some(mut song) = parsed.songs else {
                ctx.state
                    .set_loading(ctx.token, |loading| loading.songs = false);
                return;
            };
            song.title = clean_text(&song.title);
            song.sub = clean_text(&song.sub);

            let prompt = nonempty(song.image_prompt.clone());
            ctx.state
                .merge(ctx.token, |bundle| bundle.songs = Some(song.clone()));
            ctx.state
                .set_loading(ctx.token, |loading| loading.songs = false);

            if let Some(prompt) = prompt {
                if let Some(url) = ctx.card_image(&prompt).await {
                    ctx.state.merge(ctx.token, |bundle| {
                        if let Some(song) = bundle.songs.as_mut() {
                            song.img = Some(url.clone());
                        }
                    });
                }
            }
        }
        Err(e) => {
            tracing::warn!("[Engine] songs branch failed: {}", e);
            ctx.state
                .set_loading(ctx.token, |loading| loading.songs = false);
        }
    }
}
