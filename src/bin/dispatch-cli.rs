use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Client for a running email-dispatch server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one email
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Idempotency key; resending with the same key is suppressed
        #[arg(long)]
        key: Option<String>,
    },
    /// Look up a dispatch by tracking id
    Status { tracking_id: String },
    /// Show breaker state for one backend, or all of them
    Breaker { name: Option<String> },
    /// Check server liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Send {
            to,
            subject,
            body,
            key,
        } => {
            let mut request = json!({ "to": to, "subject": subject, "body": body });
            if let Some(key) = key {
                request["idempotencyKey"] = Value::String(key);
            }
            client
                .post(format!("{}/api/send-emails", cli.url))
                .json(&vec![request])
                .send()
                .await?
        }
        Commands::Status { tracking_id } => {
            client
                .get(format!("{}/api/status/{}", cli.url, tracking_id))
                .send()
                .await?
        }
        Commands::Breaker { name: Some(name) } => {
            client
                .get(format!("{}/api/breakers/{}", cli.url, name))
                .send()
                .await?
        }
        Commands::Breaker { name: None } => {
            client.get(format!("{}/api/breakers", cli.url)).send().await?
        }
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
