use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use std::path::PathBuf;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "vipwatch", about = "vipwatch VIP recognition CLI")]
struct Cli {
    /// Base URL of the vipwatchd management API
    #[arg(long, env = "VIPWATCH_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List enrolled VIP profiles
    List,
    /// Enroll a new VIP from a face photo
    Add {
        #[arg(long)]
        name: String,
        /// Tier label (e.g. "gold")
        #[arg(long)]
        category: String,
        /// JPEG or PNG with a single clear face
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        notes: Option<String>,
        /// Birthday as MM-DD
        #[arg(long)]
        dob: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Remove a VIP by face id
    Remove {
        face_id: String,
        /// Delete the profile even if the face service does not confirm removal
        #[arg(long)]
        force: bool,
    },
    /// Show the daily rollup (default: today)
    Analytics {
        /// YYYY-MM-DD
        date: Option<String>,
    },
    /// Send one image through the live detection channel
    Detect { image: PathBuf },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = Client::new();

    match cli.command {
        Commands::List => {
            let profiles = expect_json(client.get(format!("{server}/api/vips")).send().await?).await?;
            let profiles = profiles.as_array().cloned().unwrap_or_default();
            if profiles.is_empty() {
                println!("No VIPs enrolled");
            }
            for p in &profiles {
                println!(
                    "{}  {:<24} {:<10} last visit {}",
                    field(p, "faceId"),
                    field(p, "name"),
                    field(p, "category"),
                    field(p, "lastVisit"),
                );
            }
        }
        Commands::Add {
            name,
            category,
            image,
            notes,
            dob,
            tags,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("cannot read {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "face.jpg".to_string());

            let mut form = Form::new()
                .text("name", name)
                .text("category", category)
                .part("image", Part::bytes(bytes).file_name(file_name));
            for (key, value) in [("notes", notes), ("dob", dob), ("tags", tags)] {
                if let Some(value) = value {
                    form = form.text(key, value);
                }
            }

            tracing::debug!(server = %server, "enrolling profile");
            let created = expect_json(
                client
                    .post(format!("{server}/api/vips"))
                    .multipart(form)
                    .send()
                    .await?,
            )
            .await?;
            println!("Enrolled {} as {}", field(&created, "name"), field(&created, "faceId"));
        }
        Commands::Remove { face_id, force } => {
            let resp = client
                .delete(format!("{server}/api/vips/{face_id}"))
                .query(&[("force", force)])
                .send()
                .await?;
            expect_success(resp).await?;
            println!("Removed {face_id}");
        }
        Commands::Analytics { date } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let summary =
                expect_json(client.get(format!("{server}/api/analytics/{date}")).send().await?).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Detect { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("cannot read {}", image.display()))?;
            let result = detect_once(&ws_url(&server)?, STANDARD.encode(bytes)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Status => {
            let status = expect_json(client.get(format!("{server}/api/status")).send().await?).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("-")
}

/// Live detection endpoint for an `http(s)://` server base.
fn ws_url(server: &str) -> Result<String> {
    let base = if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        bail!("server must start with http:// or https://, got '{server}'");
    };
    Ok(format!("{base}/ws/live-detection"))
}

async fn detect_once(url: &str, frame: String) -> Result<Value> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("cannot connect to {url}"))?;
    ws.send(Message::Text(frame)).await?;

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                if let Err(e) = ws.close(None).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                return Ok(serde_json::from_str(&text)?);
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                bail!("server closed the channel: {reason}");
            }
            _ => {}
        }
    }
    bail!("channel ended without a result")
}

async fn expect_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{status}: {}", error_message(&body))
}

async fn expect_json(resp: Response) -> Result<Value> {
    Ok(expect_success(resp).await?.json().await?)
}

/// The `error` field of an API error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}
