use limmud::{EngineConfig, Profile, SourceTag, StudyEngine};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; variables already in the environment win.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,limmud=info")),
        )
        .init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let engine = match StudyEngine::with_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to open bundle cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // With no argument, study a verse from this week's Torah portion;
    // otherwise resolve the argument as a verse query.
    let query = std::env::args().nth(1);
    let profile = Profile::default();
    let started = match &query {
        Some(query) => engine.generate_for_query(query, profile).await,
        None => engine.generate_daily(SourceTag::Parshah, profile).await,
    };

    let handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let from_cache = handle.cache_hit();
    if !handle.wait_complete().await {
        eprintln!("generation was superseded before completing");
        return ExitCode::FAILURE;
    }

    let bundle = engine.bundle();
    if let Some(verse) = &bundle.verse {
        println!("{} ({})", verse.reference, verse.version);
        println!("{}\n", verse.text);
    }
    if let Some(interpretation) = &bundle.interpretation {
        println!("{}\n", interpretation);
    }
    for story in &bundle.stories {
        println!("Story: {}", story.title);
    }
    for poem in &bundle.poetry {
        println!("Poem: {} ({})", poem.title, poem.kind);
    }
    for item in &bundle.imagery {
        println!("Imagery: {} - {}", item.title, item.sub);
    }
    if let Some(song) = &bundle.songs {
        println!("Song: {} [{}]", song.title, song.sub);
    }
    if from_cache {
        println!("\n(served from cache)");
    }
    ExitCode::SUCCESS
}
