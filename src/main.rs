#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use passkey_server::{
    configure_services, spawn_challenge_sweeper, CeremonyEngine, ChallengeStore,
    HttpIdentityGateway, InMemoryChallengeStore, InMemoryCredentialStore, PasskeyServerSettings,
    VERSION,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables;
    // missing relying-party or secret settings stop the process here
    let settings = PasskeyServerSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;
    settings.init_logging();

    let challenges: Arc<dyn ChallengeStore> = Arc::new(InMemoryChallengeStore::new());
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let gateway = HttpIdentityGateway::from_settings(&settings)
        .map_err(|e| std::io::Error::other(format!("Failed to create identity gateway: {e}")))?;

    let engine = CeremonyEngine::from_settings(
        &settings,
        challenges.clone(),
        credentials,
        Arc::new(gateway),
    )
    .map_err(|e| std::io::Error::other(format!("Failed to create ceremony engine: {e}")))?;

    let sweeper = spawn_challenge_sweeper(
        challenges,
        settings.challenge_ttl(),
        Duration::from_secs(settings.ceremony.sweep_interval_seconds.max(1)),
    );

    let result = start_server(web::Data::new(engine), &settings).await;
    sweeper.abort();
    result
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    engine: web::Data<CeremonyEngine>,
    settings: &PasskeyServerSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &PasskeyServerSettings) {
    println!("Starting Passkey Server {VERSION} on http://{bind_address}");
    println!(
        "Relying party: {} ({})",
        settings.relying_party.name, settings.relying_party.id
    );
    println!("Expected origin: {}", settings.expected_origin());
    println!("Identity service: {}", settings.identity.base_url);
    println!();
    println!("Registration endpoints:");
    println!("  POST /auth/setup        - Start passkey registration");
    println!("  POST /auth/verify       - Complete passkey registration");
    println!();
    println!("Authentication endpoints:");
    println!("  POST /auth/login/setup  - Start passkey login");
    println!("  POST /auth/login/verify - Complete passkey login, returns a session token");
    println!("  GET  /auth/session      - Resolve a bearer token");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping              - Health check");
}
