//! Generation cycle orchestration.
//!
//! A cycle starts with a blocking verse fetch, then fans out to six branches
//! (interpretation, context, stories, poetry, imagery, songs) driven by a
//! supervisor task. The entry point returns once the interpretation text is
//! in; the rest streams into the shared bundle and the supervisor persists
//! the finished bundle to the cache. Starting a new cycle supersedes the old
//! one: its supervisor is aborted and any merges still in flight are dropped.

mod branches;
mod state;

pub use state::CycleToken;

use crate::cache::{cache_key, BundleCache, CacheError};
use crate::client::{ClientError, ContentBackend, ContentKind, HttpBackend};
use crate::config::EngineConfig;
use crate::types::{LoadingStates, Profile, StudyBundle, VerseRef};
use branches::BranchCtx;
use serde_json::{json, Value};
use state::SharedState;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;

const VERSE_ERROR_STATUS: &str = "Connection error. Please try again.";
/// How long the error status stays up before the loading flags reset.
const ERROR_STATUS_HOLD: Duration = Duration::from_millis(1500);

/// Scripture collections a daily verse can be drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// The current week's Torah portion.
    Parshah,
    Torah,
    Prophets,
    Writings,
    Talmud,
    Psalms,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Parshah => "Parshah",
            SourceTag::Torah => "Torah",
            SourceTag::Prophets => "Nevi'im (Prophets)",
            SourceTag::Writings => "Ketuvim (Writings)",
            SourceTag::Talmud => "Talmud",
            SourceTag::Psalms => "Tehillim (Psalms)",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal cycle failures. Branch failures are absorbed and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The verse itself could not be obtained, so there is nothing to
    /// generate content for.
    #[error("could not fetch a verse: {0}")]
    VerseAcquisition(#[source] ClientError),
    /// A newer cycle started before this one reached fan-out.
    #[error("generation cycle superseded by a newer request")]
    Superseded,
}

/// Handle to a started cycle. Success of the entry point means "verse
/// acquired and interpretation text merged"; the handle lets callers await
/// the rest.
#[derive(Debug)]
pub struct CycleHandle {
    token: CycleToken,
    cache_hit: bool,
    done: Option<oneshot::Receiver<()>>,
}

impl CycleHandle {
    pub fn token(&self) -> CycleToken {
        self.token
    }

    /// True when the bundle was served whole from the cache and no content
    /// endpoints were called.
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Wait for every branch chain (text and images) to finish. Returns false
    /// if the cycle was superseded and abandoned before completing.
    pub async fn wait_complete(self) -> bool {
        match self.done {
            None => true,
            Some(rx) => rx.await.is_ok(),
        }
    }
}

/// The study content engine: verse acquisition, six-branch fan-out, reactive
/// bundle state, and the persistent bundle cache.
pub struct StudyEngine {
    backend: Arc<dyn ContentBackend>,
    cache: Arc<BundleCache>,
    state: Arc<SharedState>,
}

impl StudyEngine {
    pub fn new(backend: Arc<dyn ContentBackend>, cache: BundleCache) -> Self {
        Self {
            backend,
            cache: Arc::new(cache),
            state: Arc::new(SharedState::new()),
        }
    }

    /// Wire up the HTTP backend and the default cache location.
    pub fn with_config(config: &EngineConfig) -> Result<Self, CacheError> {
        Ok(Self::new(Arc::new(HttpBackend::new(config)), BundleCache::open()?))
    }

    /// Latest bundle snapshot.
    pub fn bundle(&self) -> StudyBundle {
        self.state.bundle()
    }

    /// Latest per-branch loading flags.
    pub fn loading(&self) -> LoadingStates {
        self.state.loading()
    }

    pub fn watch_bundle(&self) -> watch::Receiver<StudyBundle> {
        self.state.watch_bundle()
    }

    pub fn watch_loading(&self) -> watch::Receiver<LoadingStates> {
        self.state.watch_loading()
    }

    pub fn watch_status(&self) -> watch::Receiver<String> {
        self.state.watch_status()
    }

    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear()
    }

    /// Start a cycle for a verse drawn from `source`.
    pub async fn generate_daily(
        &self,
        source: SourceTag,
        profile: Profile,
    ) -> Result<CycleHandle, EngineError> {
        self.run_cycle(
            json!({ "source": source.as_str() }),
            "Getting scripture...".to_string(),
            profile,
        )
        .await
    }

    /// Start a cycle for a verse resolved from a free-text query.
    pub async fn generate_for_query(
        &self,
        query: &str,
        profile: Profile,
    ) -> Result<CycleHandle, EngineError> {
        self.run_cycle(
            json!({ "verseQuery": query }),
            format!("Searching for {}...", query),
            profile,
        )
        .await
    }

    async fn run_cycle(
        &self,
        verse_payload: Value,
        status: String,
        profile: Profile,
    ) -> Result<CycleHandle, EngineError> {
        let token = self.state.begin_cycle(&status);

        let verse_value = match self.backend.invoke(ContentKind::Verse, &verse_payload).await {
            Ok(value) => value,
            Err(e) => {
                return Err(self.fail_verse(token, EngineError::VerseAcquisition(e)).await)
            }
        };
        let verse: VerseRef = match serde_json::from_value(verse_value) {
            Ok(verse) => verse,
            Err(e) => {
                let error = EngineError::VerseAcquisition(ClientError::Decode {
                    kind: ContentKind::Verse,
                    source: e,
                });
                return Err(self.fail_verse(token, error).await);
            }
        };
        if !self.state.is_current(token) {
            return Err(EngineError::Superseded);
        }

        let key = cache_key(&verse.reference, &profile);
        match self.cache.get(&key) {
            Ok(Some(bundle)) => {
                tracing::info!("[Engine] cache hit for {}", verse.reference);
                if !self.state.adopt_bundle(token, bundle) {
                    return Err(EngineError::Superseded);
                }
                return Ok(CycleHandle {
                    token,
                    cache_hit: true,
                    done: None,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[Engine] cache read failed for {}: {}", key, e),
        }

        if !self.state.merge(token, |bundle| bundle.verse = Some(verse.clone())) {
            return Err(EngineError::Superseded);
        }
        self.state.set_loading(token, |loading| {
            *loading = LoadingStates {
                verse: false,
                interpretation: true,
                context: true,
                stories: true,
                poetry: true,
                imagery: true,
                songs: true,
            };
        });
        self.state.set_status(token, "Generating interpretation...");

        let ctx = Arc::new(BranchCtx {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            token,
            payload: build_payload(&verse, &profile),
            age_hint: profile.age_range.clone(),
        });

        // Blocking leg: hold the caller until the interpretation text lands.
        let hero_prompt = branches::interpretation_text(&ctx).await;
        if !self.state.is_current(token) {
            return Err(EngineError::Superseded);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let supervisor = tokio::spawn(async move {
            let mut set = JoinSet::new();
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::interpretation_images(&ctx, hero_prompt).await });
            }
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::context(&ctx).await });
            }
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::stories(&ctx).await });
            }
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::poetry(&ctx).await });
            }
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::imagery(&ctx).await });
            }
            {
                let ctx = Arc::clone(&ctx);
                set.spawn(async move { branches::songs(&ctx).await });
            }

            // Completion is the join over every branch chain, images included.
            while set.join_next().await.is_some() {}

            if let Some(bundle) = state.snapshot_if_current(token) {
                match cache.set(&key, &bundle) {
                    Ok(()) => tracing::info!("[Engine] cached bundle for {}", key),
                    Err(e) => tracing::warn!("[Engine] cache write failed for {}: {}", key, e),
                }
            }
            state.set_status(token, "");
            let _ = done_tx.send(());
        });
        self.state.attach_supervisor(token, supervisor);

        Ok(CycleHandle {
            token,
            cache_hit: false,
            done: Some(done_rx),
        })
    }

    /// Surface the verse error, hold it briefly, then settle the flags.
    async fn fail_verse(&self, token: CycleToken, error: EngineError) -> EngineError {
        tracing::error!("[Engine] {}", error);
        self.state.set_status(token, VERSE_ERROR_STATUS);
        tokio::time::sleep(ERROR_STATUS_HOLD).await;
        self.state
            .set_loading(token, |loading| *loading = LoadingStates::idle());
        error
    }
}

/// Request body shared by every content branch.
fn build_payload(verse: &VerseRef, profile: &Profile) -> Value {
    json!({
        "verseReference": verse.reference,
        "verseText": verse.text,
        "source": verse.source,
        "ageRange": profile.age_range,
        "gender": profile.gender,
        "stageSituation": profile.stage_situation,
        "language": profile.language,
        "contentMode": profile.content_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentMode;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct MockBackend {
        calls: Mutex<HashMap<ContentKind, usize>>,
        image_calls: AtomicUsize,
        fail: HashSet<ContentKind>,
        latency: HashMap<ContentKind, Duration>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                calls: Mutex::new(HashMap::new()),
                image_calls: AtomicUsize::new(0),
                fail: HashSet::new(),
                latency: HashMap::new(),
            }
        }

        fn failing(kinds: &[ContentKind]) -> Self {
            let mut mock = Self::new();
            mock.fail = kinds.iter().copied().collect();
            mock
        }

        fn with_latency(mut self, pairs: &[(ContentKind, u64)]) -> Self {
            for (kind, millis) in pairs {
                self.latency.insert(*kind, Duration::from_millis(*millis));
            }
            self
        }

        fn count(&self, kind: ContentKind) -> usize {
            self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
        }

        fn content_calls(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(kind, _)| **kind != ContentKind::Verse)
                .map(|(_, count)| count)
                .sum()
        }
    }

    #[async_trait]
    impl ContentBackend for MockBackend {
        async fn invoke(&self, kind: ContentKind, payload: &Value) -> Result<Value, ClientError> {
            *self.calls.lock().unwrap().entry(kind).or_insert(0) += 1;
            if let Some(delay) = self.latency.get(&kind) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail.contains(&kind) {
                return Err(ClientError::Status {
                    kind,
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "upstream unavailable".to_string(),
                });
            }
            Ok(match kind {
                ContentKind::Verse => {
                    let reference = payload["verseQuery"].as_str().unwrap_or("Devarim 6:4-5");
                    json!({
                        "reference": reference,
                        "version": "Hebrew Bible",
                        "text": "Hear, O Israel: the Lord is our God, the Lord is one.",
                        "source": "Torah"
                    })
                }
                ContentKind::Interpretation => json!({
                    "interpretation": "The **Shema** calls every generation to listen.",
                    "heroImagePrompt": "sunrise over the Judean hills"
                }),
                ContentKind::Context => json!({
                    "context": {
                        "whoIsSpeaking": "Moshe",
                        "setting": "The plains of Moav"
                    },
                    "contextImagePrompt": "ancient plains at dusk"
                }),
                ContentKind::Story => {
                    let story_type = payload["storyType"].as_str().unwrap_or("unknown");
                    json!({
                        "title": format!("A {} story", story_type),
                        "text": "She remembered the words her grandmother sang.",
                        "imagePrompt": "a candle in a window"
                    })
                }
                ContentKind::Poem => json!({
                    "poem": {
                        "title": "Hear",
                        "type": payload["poemType"].as_str().unwrap_or("classic"),
                        "text": "One voice, one morning, one name.",
                        "imagePrompt": "an open scroll"
                    }
                }),
                ContentKind::Imagery => json!({
                    "imagery": [
                        {
                            "title": "Oneness",
                            "sub": "A single thread through the whole text",
                            "icon": "all_inclusive",
                            "imagePrompt": "a single golden thread"
                        },
                        {
                            "title": "Hearing",
                            "sub": "Listening as the first act of faith",
                            "icon": "hearing",
                            "imagePrompt": "wind over wheat"
                        }
                    ]
                }),
                ContentKind::Songs => json!({
                    "songs": {
                        "title": "One",
                        "sub": "Inspirational Pop",
                        "lyrics": "[Verse 1]\nHear, O Israel, the morning calls",
                        "prompt": "uplifting pop, female vocals",
                        "imagePrompt": "light through clouds"
                    }
                }),
            })
        }

        async fn generate_image(&self, request: crate::client::ImageRequest) -> Option<String> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            Some(format!(
                "https://img.test/{}x{}.jpg",
                request.width, request.height
            ))
        }
    }

    fn test_profile() -> Profile {
        Profile {
            age_range: "adult".to_string(),
            gender: "female".to_string(),
            stage_situation: "Nothing special".to_string(),
            language: "en".to_string(),
            content_mode: ContentMode::Casual,
        }
    }

    fn engine_at(mock: Arc<MockBackend>, dir: &Path) -> StudyEngine {
        let cache = BundleCache::open_at(dir.to_path_buf()).unwrap();
        StudyEngine::new(mock, cache)
    }

    fn probe_cache(dir: &Path) -> BundleCache {
        BundleCache::open_at(dir.to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_full_cycle_assembles_and_caches() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::new());
        let engine = engine_at(Arc::clone(&mock), dir.path());

        let handle = engine
            .generate_daily(SourceTag::Parshah, test_profile())
            .await
            .unwrap();
        assert!(!handle.cache_hit());
        assert!(handle.wait_complete().await);

        let bundle = engine.bundle();
        assert_eq!(bundle.verse.as_ref().unwrap().reference, "Devarim 6:4-5");

        let interpretation = bundle.interpretation.as_deref().unwrap();
        assert!(interpretation.contains("Shema"));
        assert!(!interpretation.contains("**"), "markdown should be stripped");
        assert_eq!(bundle.hero_image.as_deref(), Some("https://img.test/1024x768.jpg"));

        let context = bundle.context.as_ref().unwrap();
        assert_eq!(context.who_is_speaking.as_deref(), Some("Moshe"));
        assert!(bundle.context_hero_image.is_some());

        assert_eq!(bundle.stories.len(), 2);
        assert_eq!(bundle.stories[0].title, "A contemporary story");
        assert_eq!(bundle.stories[1].title, "A historical story");
        assert!(bundle.stories.iter().all(|s| s.img.is_some()));

        assert_eq!(bundle.poetry.len(), 2);
        assert_eq!(bundle.poetry[0].kind, "classic");
        assert_eq!(bundle.poetry[1].kind, "freeverse");

        assert_eq!(bundle.imagery.len(), 2);
        assert!(bundle.imagery.iter().all(|i| i.img.is_some()));

        let songs = bundle.songs.as_ref().unwrap();
        assert!(songs.lyrics.contains("[Verse 1]"), "lyrics keep section markers");
        assert!(songs.img.is_some());

        assert!(!engine.loading().any());

        let key = cache_key("Devarim 6:4-5", &test_profile());
        let cached = probe_cache(dir.path()).get(&key).unwrap().unwrap();
        assert_eq!(cached, bundle);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_content_endpoints() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::new());
        let engine = engine_at(Arc::clone(&mock), dir.path());
        let profile = test_profile();

        let first = engine
            .generate_daily(SourceTag::Parshah, profile.clone())
            .await
            .unwrap();
        assert!(first.wait_complete().await);
        let calls_after_first = mock.content_calls();

        let second = engine
            .generate_daily(SourceTag::Parshah, profile)
            .await
            .unwrap();
        assert!(second.cache_hit());
        assert!(second.wait_complete().await);

        assert_eq!(mock.count(ContentKind::Verse), 2);
        assert_eq!(mock.content_calls(), calls_after_first);
        assert!(engine.bundle().is_complete());
        assert!(!engine.loading().any());
    }

    #[tokio::test]
    async fn test_songs_failure_does_not_block_completion() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::failing(&[ContentKind::Songs]));
        let engine = engine_at(Arc::clone(&mock), dir.path());

        let handle = engine
            .generate_daily(SourceTag::Psalms, test_profile())
            .await
            .unwrap();
        assert!(handle.wait_complete().await);

        let bundle = engine.bundle();
        assert!(bundle.songs.is_none());
        assert!(bundle.interpretation.is_some());
        assert!(bundle.context.is_some());
        assert_eq!(bundle.stories.len(), 2);
        assert_eq!(bundle.poetry.len(), 2);
        assert!(!bundle.imagery.is_empty());
        assert!(!engine.loading().any());

        let key = cache_key("Devarim 6:4-5", &test_profile());
        assert!(probe_cache(dir.path()).get(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_story_failure_merges_placeholders() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::failing(&[ContentKind::Story]));
        let engine = engine_at(Arc::clone(&mock), dir.path());

        let handle = engine
            .generate_daily(SourceTag::Torah, test_profile())
            .await
            .unwrap();
        assert!(handle.wait_complete().await);

        let bundle = engine.bundle();
        assert_eq!(bundle.stories.len(), 2);
        assert!(bundle.stories.iter().all(|s| s.title == "Story" && s.text.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verse_failure_sets_error_status() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::failing(&[ContentKind::Verse]));
        let engine = engine_at(Arc::clone(&mock), dir.path());

        let error = engine
            .generate_daily(SourceTag::Torah, test_profile())
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::VerseAcquisition(_)));
        assert_eq!(engine.watch_status().borrow().as_str(), VERSE_ERROR_STATUS);
        assert!(!engine.loading().any());
        assert_eq!(mock.content_calls(), 0);

        let key = cache_key("Devarim 6:4-5", &test_profile());
        assert!(probe_cache(dir.path()).get(&key).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_branch_latency_order_is_immaterial() {
        let dir = tempdir().unwrap();
        let mock = Arc::new(MockBackend::new().with_latency(&[
            (ContentKind::Verse, 5),
            (ContentKind::Interpretation, 40),
            (ContentKind::Context, 10),
            (ContentKind::Story, 250),
            (ContentKind::Poem, 30),
            (ContentKind::Imagery, 5),
            (ContentKind::Songs, 120),
        ]));
        let engine = engine_at(Arc::clone(&mock), dir.path());

        let handle = engine
            .generate_daily(SourceTag::Prophets, test_profile())
            .await
            .unwrap();
        assert!(handle.wait_complete().await);

        let bundle = engine.bundle();
        assert!(bundle.interpretation.is_some());
        assert!(bundle.context.is_some());
        assert_eq!(bundle.stories.len(), 2);
        assert_eq!(bundle.poetry.len(), 2);
        assert_eq!(bundle.imagery.len(), 2);
        assert!(bundle.songs.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_cycle_supersedes_older() {
        let dir = tempdir().unwrap();
        let all_kinds = [
            ContentKind::Verse,
            ContentKind::Interpretation,
            ContentKind::Context,
            ContentKind::Story,
            ContentKind::Poem,
            ContentKind::Imagery,
            ContentKind::Songs,
        ];
        let latencies: Vec<_> = all_kinds.iter().map(|k| (*k, 20)).collect();
        let mock = Arc::new(MockBackend::new().with_latency(&latencies));
        let engine = Arc::new(engine_at(Arc::clone(&mock), dir.path()));

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .generate_for_query("Bereshit 1:1", test_profile())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = engine
            .generate_for_query("Shemot 3:14", test_profile())
            .await
            .unwrap();
        assert!(second.wait_complete().await);
        assert_eq!(engine.bundle().verse.unwrap().reference, "Shemot 3:14");

        let first = first.await.unwrap();
        assert!(matches!(first, Err(EngineError::Superseded)));

        let probe = probe_cache(dir.path());
        let profile = test_profile();
        assert!(probe.get(&cache_key("Bereshit 1:1", &profile)).unwrap().is_none());
        assert!(probe.get(&cache_key("Shemot 3:14", &profile)).unwrap().is_some());
    }
}
