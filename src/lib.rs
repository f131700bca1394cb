//! Personalized scripture-study content engine.
//!
//! Given a verse (picked daily from a source collection or resolved from a
//! free-text query) and a reader profile, the engine fans out to a set of
//! generation endpoints and assembles an observable [`StudyBundle`]:
//! interpretation, historical context, stories, poetry, visual imagery, and a
//! song, each enriched with generated images. Finished bundles are persisted
//! in a versioned on-disk cache keyed by verse and profile, so repeat studies
//! are served without any generation calls.

pub mod cache;
pub mod chat;
pub mod client;
pub mod config;
pub mod engine;
pub mod sanitize;
pub mod types;

pub use cache::{cache_key, BundleCache, CacheError};
pub use chat::{ChatSession, ChatTurn, Speaker};
pub use client::{ClientError, ContentBackend, ContentKind, HttpBackend, ImageRequest};
pub use config::{ConfigError, EngineConfig};
pub use engine::{CycleHandle, CycleToken, EngineError, SourceTag, StudyEngine};
pub use types::{
    ContentMode, ContextData, ImageryData, LoadingStates, PoetryData, Profile, SongData,
    StoryData, StudyBundle, VerseRef,
};
