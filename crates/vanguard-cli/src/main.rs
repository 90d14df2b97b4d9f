//! `vanguardctl` - command line control for the Vanguard daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vanguard_core::{Color, SourceId};
use vanguard_ipc::{EventType, IpcClient, Method};

#[derive(Parser, Debug)]
#[command(name = "vanguardctl", version, about = "Control the Vanguard keyboard lighting daemon")]
struct Cli {
    /// Daemon socket, defaults to `$XDG_RUNTIME_DIR/vanguard/daemon.sock`
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Action {
    /// Show the mirror status
    Status,
    /// List color sources
    Sources,
    /// Start mirroring
    Enable,
    /// Stop mirroring and release the keyboard
    Disable,
    /// Mirror the given source
    Select { id: u32 },
    /// Stop following any source
    Deselect,
    /// Register a source or replace its colors
    Push {
        id: u32,
        name: String,
        /// Colors as `0xRRGGBB` or `#RRGGBB`; the first one is mirrored
        #[arg(required = true)]
        colors: Vec<Color>,
        /// Brightness applied to every color
        #[arg(long)]
        brightness: Option<u8>,
    },
    /// Remove a source
    Remove { id: u32 },
    /// Print daemon events as they arrive
    Watch {
        /// Only these events, all when omitted
        #[arg(long = "event", value_enum)]
        events: Vec<WatchEvent>,
    },
    /// Stop the daemon
    Shutdown,
}

/// Event filter for `watch`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum WatchEvent {
    Status,
    Sources,
    Error,
}

impl From<WatchEvent> for EventType {
    fn from(event: WatchEvent) -> Self {
        match event {
            WatchEvent::Status => Self::StatusChanged,
            WatchEvent::Sources => Self::SourcesChanged,
            WatchEvent::Error => Self::Error,
        }
    }
}

impl Action {
    /// The request for one-shot actions; `None` for `watch`.
    fn method(&self) -> Option<Method> {
        let method = match self {
            Self::Status => Method::GetStatus,
            Self::Sources => Method::ListSources,
            Self::Enable => Method::SetEnabled { enabled: true },
            Self::Disable => Method::SetEnabled { enabled: false },
            Self::Select { id } => Method::SelectSource { source: Some(SourceId(*id)) },
            Self::Deselect => Method::SelectSource { source: None },
            Self::Push { id, name, colors, brightness } => Method::UpdateSource {
                id: SourceId(*id),
                name: name.clone(),
                colors: colors
                    .iter()
                    .map(|color| brightness.map_or(*color, |b| color.with_brightness(b)))
                    .collect(),
            },
            Self::Remove { id } => Method::RemoveSource { id: SourceId(*id) },
            Self::Shutdown => Method::Shutdown,
            Self::Watch { .. } => return None,
        };
        Some(method)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(vanguard_ipc::socket_path);
    debug!(?socket, "Connecting to daemon");

    let mut client = IpcClient::connect(&socket)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", socket.display()))?;

    if let Action::Watch { events } = &cli.command {
        let events = events.iter().copied().map(EventType::from).collect();
        client.call(Method::Subscribe { events }).await?;

        while let Some(event) = client.events().recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    let Some(method) = cli.command.method() else {
        return Ok(());
    };
    let value = client.call(method).await?;

    match cli.command {
        Action::Status => print_status(&value),
        Action::Sources => print_sources(&value),
        _ => println!("{}", serde_json::to_string_pretty(&value)?),
    }

    Ok(())
}

fn print_status(value: &Value) {
    if let Some(text) = value["status_text"].as_str() {
        println!("{text}");
    }
    println!("  enabled:  {}", value["enabled"]);
    println!("  source:   {}", value["selected_source"]);
    println!("  color:    {}", value["last_color"]);
    println!("  keyboard: {}", if value["link_open"] == true { "open" } else { "closed" });
    println!("  sources:  {}", value["sources"]);
}

fn print_sources(value: &Value) {
    let Some(sources) = value.as_array() else {
        return;
    };
    if sources.is_empty() {
        println!("No sources registered");
    }
    for source in sources {
        println!("{:>4}  {}", source["id"], source["name"].as_str().unwrap_or_default());
    }
}
