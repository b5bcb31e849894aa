//! Main Entrypoint for the Huddle API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the persona prompts.
//! 3. Building the shared state: log, roster, UI connections, platform client, personas.
//! 4. Starting the primary persona's voice session.
//! 5. Serving HTTP until Ctrl+C, then closing the persona sessions.

use anyhow::Context;
use axum::http::HeaderValue;
use gemini_realtime::LiveConfig;
use huddle_api::{
    companion::RecallProvisioning,
    config::Config,
    meeting::MeetingContext,
    persona::{PersonaDirectory, SessionDeps, TurnTimings, builtin_profiles},
    recall::RecallClient,
    router::create_router,
    state::AppState,
    ws::ConnectionManager,
};
use huddle_core::{ConversationLog, Roster};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Persona Prompts ---
    let prompts = load_prompts(&config.prompts_path)?;
    let profiles = builtin_profiles(&prompts)?;

    // --- 4. Initialize Shared Services ---
    let log = ConversationLog::new();
    let roster = Roster::new();
    let connections = Arc::new(ConnectionManager::new());
    let meeting = MeetingContext::new();
    let recall = Arc::new(
        RecallClient::new(&config.recall_api_url, &config.recall_api_key)
            .context("Failed to build meeting platform client")?,
    );

    let live = LiveConfig::new(&config.gemini_ws_url, &config.gemini_api_key)
        .with_connect_timeout(config.gemini_connect_timeout);
    let deps = SessionDeps {
        live,
        model: config.gemini_model.clone(),
        log,
        roster: roster.clone(),
        sink: connections.clone(),
        timings: TurnTimings::default(),
    };
    let provisioning = Arc::new(RecallProvisioning {
        recall: recall.clone(),
        meeting: meeting.clone(),
        webhook_url: config.webhook_url(),
        public_base_url: config.public_base_url.clone(),
    });
    let personas = PersonaDirectory::new(profiles, deps, Some(provisioning));

    // --- 5. Start the primary persona ---
    personas.start_autostart().await;

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        personas: personas.clone(),
        roster,
        connections,
        recall,
        meeting,
    });

    // --- 6. Create Router and Apply Middleware ---
    let app = create_router(app_state).layer(cors_layer(&config.allowed_origins));

    // --- 7. Start Server ---
    info!(
        model = %config.gemini_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    personas.shutdown().await;
    info!("Server has shut down.");
    Ok(())
}
