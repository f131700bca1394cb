//! Core data types for the study engine.
//!
//! Field names serialize in camelCase to match the generation endpoints'
//! wire format.

use serde::{Deserialize, Serialize};

/// A scripture citation plus its text and source collection.
///
/// Created once per generation cycle and immutable afterwards; lives only
/// embedded in a [`StudyBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerseRef {
    pub reference: String,
    pub version: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Register of the generated content: warm devotional prose or scholarly analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    #[default]
    Casual,
    Academic,
}

impl ContentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentMode::Casual => "casual",
            ContentMode::Academic => "academic",
        }
    }
}

/// User personalization attributes driving content generation.
///
/// Snapshotted by the caller before a cycle starts and passed in explicitly;
/// the engine never reads ambient settings, so a profile edit mid-cycle
/// cannot tear a running generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub age_range: String,
    pub gender: String,
    pub stage_situation: String,
    pub language: String,
    pub content_mode: ContentMode,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            age_range: String::new(),
            gender: String::new(),
            stage_situation: "Nothing special".to_string(),
            language: "en".to_string(),
            content_mode: ContentMode::Casual,
        }
    }
}

/// Historical-context panel for a verse. All fields optional; whatever the
/// endpoint returns is merged as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who_is_speaking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_listeners: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_the_conversation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_backdrop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
}

/// One generated story. `img` is enriched after the story's own image call
/// completes; the textual fields are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryData {
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl StoryData {
    /// Placeholder merged when a story call fails or returns no title.
    pub fn stub() -> Self {
        Self {
            title: "Story".to_string(),
            text: String::new(),
            image_prompt: None,
            img: None,
        }
    }
}

/// One generated poem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoetryData {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl PoetryData {
    /// Placeholder merged when a poem call fails.
    pub fn stub() -> Self {
        Self {
            title: "Poem".to_string(),
            kind: "Verse".to_string(),
            text: String::new(),
            image_prompt: None,
            img: None,
        }
    }
}

/// One symbol/theme card from the imagery branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageryData {
    pub title: String,
    pub sub: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

/// A generated song: lyrics plus an audio-generation prompt. Lyrics keep
/// their `[Verse 1]`-style section markers, so they are never run through
/// the sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongData {
    pub title: String,
    pub sub: String,
    pub lyrics: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

/// The accumulating result of one generation cycle.
///
/// Every slot appears monotonically and independently; nothing but `verse` is
/// guaranteed present at any instant while a cycle is running. Once persisted
/// to the cache the bundle is effectively frozen (cache reads return copies).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<VerseRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_hero_image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<StoryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poetry: Vec<PoetryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imagery: Vec<ImageryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<SongData>,
}

impl StudyBundle {
    /// The minimal field presence required for a cached bundle to be reused:
    /// an interpretation and at least one story.
    pub fn is_complete(&self) -> bool {
        self.interpretation.is_some() && !self.stories.is_empty()
    }
}

/// Per-branch loading flags. A flag goes up when its branch starts and comes
/// down when the branch's primary (non-image) result lands, independent of
/// any image sub-fetch still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingStates {
    pub verse: bool,
    pub interpretation: bool,
    pub context: bool,
    pub stories: bool,
    pub poetry: bool,
    pub imagery: bool,
    pub songs: bool,
}

impl LoadingStates {
    /// All flags down.
    pub fn idle() -> Self {
        Self::default()
    }

    /// True while any branch (or the verse fetch) is still loading.
    pub fn any(&self) -> bool {
        self.verse
            || self.interpretation
            || self.context
            || self.stories
            || self.poetry
            || self.imagery
            || self.songs
    }
}
