//! Chat Stream Client - command line
//!
//! Streams one assistant reply from an NDJSON chat endpoint to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chat_stream_client::{
    ChatMessage, ClientConfig, EventKind, StreamClient, StreamEvent, StreamOutcome,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat-stream")]
#[command(about = "Resilient streaming chat client")]
struct Cli {
    /// Path to the YAML config file (default: chat-stream.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Streaming endpoint (overrides config and env)
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Chat {
        /// Message text
        #[arg(short, long)]
        message: String,

        /// Reuse an existing session id
        #[arg(long)]
        session_id: Option<String>,

        /// Disable heartbeat monitoring and reconnection
        #[arg(long)]
        no_resilience: bool,

        /// Print Prometheus metrics after the reply
        #[arg(long)]
        metrics: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the reply
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_stream_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_yaml_and_env(cli.config.as_deref());
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    match cli.command {
        Commands::Chat {
            message,
            session_id,
            no_resilience,
            metrics,
        } => {
            if no_resilience {
                config.resilience = false;
            }
            run_chat(config, message, session_id, metrics).await
        }
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config.to_yaml())
                .context("Failed to serialize configuration")?;
            print!("{yaml}");
            Ok(())
        }
    }
}

async fn run_chat(
    config: ClientConfig,
    message: String,
    session_id: Option<String>,
    metrics: bool,
) -> Result<()> {
    let client = StreamClient::from_config(config).context("Failed to create stream client")?;

    let printed = Arc::new(Mutex::new(String::new()));
    let on_delta = printed.clone();
    client.on(EventKind::Delta, move |event| {
        if let StreamEvent::Delta { content, .. } = event {
            if let Ok(mut printed) = on_delta.lock() {
                printed.push_str(content);
            }
            write_stdout(content);
        }
    });
    // A `final` chunk may rewrite the reply or be the only content sent
    client.on(EventKind::Complete, move |event| {
        if let StreamEvent::Complete { content } = event {
            let tail = match printed.lock() {
                Ok(printed) => unprinted_tail(&printed, content),
                Err(_) => None,
            };
            if let Some(tail) = tail {
                write_stdout(&tail);
            }
        }
    });
    client.on(EventKind::ToolStart, |event| {
        if let StreamEvent::ToolStart { name, .. } = event {
            tracing::info!(tool = %name, "Tool started");
        }
    });
    client.on(EventKind::ReconnectionAttempt, |event| {
        if let StreamEvent::ReconnectionAttempt {
            attempt,
            max_attempts,
            delay_ms,
        } = event
        {
            eprintln!("\n[reconnecting {attempt}/{max_attempts} in {delay_ms}ms]");
        }
    });

    let stream = client.stream_chat(vec![ChatMessage::user(message)], session_id);
    tokio::pin!(stream);

    let outcome = tokio::select! {
        result = &mut stream => result,
        _ = tokio::signal::ctrl_c() => {
            client.stop().await;
            stream.await
        }
    };

    println!();
    match outcome.context("Chat stream failed")? {
        StreamOutcome::Completed => {}
        StreamOutcome::Aborted => eprintln!("[aborted]"),
    }

    if metrics {
        print!("{}", client.prometheus_metrics().await);
    }

    Ok(())
}

fn write_stdout(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{text}");
    let _ = stdout.flush();
}

/// Text of the completed reply that the delta printer has not shown yet.
///
/// When the reply no longer extends what was printed it is repeated in full
/// on a new line.
fn unprinted_tail(printed: &str, content: &str) -> Option<String> {
    match content.strip_prefix(printed) {
        Some("") => None,
        Some(rest) => Some(rest.to_owned()),
        None => Some(format!("\n{content}")),
    }
}
