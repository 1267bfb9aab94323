//! Email dispatch service.
//!
//! # Architecture Overview
//!
//! ```text
//!   POST /api/send-emails
//!          │
//!          ▼
//!   ┌──────────────┐   duplicate    ┌────────────────┐
//!   │ EmailService │───────────────▶│ tracking table │
//!   └──────┬───────┘                └────────────────┘
//!          │ admitted by RateLimiter
//!          ▼
//!   ┌──────────────────────────┐  failure  ┌──────────────────────────┐
//!   │ breaker(primary)         │──────────▶│ breaker(secondary)       │
//!   │   retry(primary.send)    │           │   retry(secondary.send)  │
//!   └──────────────────────────┘           └──────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use email_dispatch::backends::{EmailBackend, SimulatedBackend};
use email_dispatch::config::{load_config, DispatchConfig};
use email_dispatch::dispatch::{DispatchSettings, EmailService, SendRequest};
use email_dispatch::http::HttpServer;
use email_dispatch::lifecycle::{signals, Shutdown};
use email_dispatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "email-dispatch")]
#[command(about = "Resilient email dispatcher with primary/secondary fallback", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Send a fixed batch of demo emails and print the results
    Demo,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("email-dispatch v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let primary: Arc<dyn EmailBackend> =
        Arc::new(SimulatedBackend::from_config(&config.backends.primary));
    let secondary: Arc<dyn EmailBackend> =
        Arc::new(SimulatedBackend::from_config(&config.backends.secondary));
    let service = Arc::new(EmailService::new(
        primary,
        secondary,
        DispatchSettings::from_config(&config),
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, service).await?,
        Command::Demo => demo(&service).await,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn serve(
    config: DispatchConfig,
    service: Arc<EmailService>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let sweeper = service.idempotency().spawn_sweeper(
        Duration::from_secs(config.idempotency.sweep_interval_secs),
        shutdown.subscribe(),
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(service, &config.server);
    server.run(listener, shutdown.subscribe()).await?;

    sweeper.await?;
    Ok(())
}

async fn demo(service: &Arc<EmailService>) {
    let emails = [
        ("user1@example.com", "Welcome", "Welcome to our service!"),
        ("user2@example.com", "Notification", "You have a new notification"),
        ("user3@example.com", "Promotion", "Special offer just for you!"),
        ("user4@example.com", "Reminder", "Don't forget about our meeting"),
        ("user5@example.com", "Account", "Your account summary"),
        ("user6@example.com", "Alert", "Important security alert"),
    ];

    for (to, subject, body) in emails {
        println!("\nSending email to {to}...");
        let request =
            SendRequest::new(to, subject, body).with_idempotency_key(format!("{to}-{subject}"));
        let result = service.send(request).await;

        println!("Result: {}", if result.success { "SUCCESS" } else { "FAILURE" });
        println!("Backend: {}", result.backend_used);
        println!("Retries: {}", result.retry_count);
        println!("Status: {}", result.status.as_str());
        println!("Message: {}", result.message);
    }

    println!("\nCircuit Breaker Status:");
    for (name, state) in service.breaker_states() {
        println!("{name}: {state}");
    }
}
