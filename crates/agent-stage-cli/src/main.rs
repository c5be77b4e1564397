use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use agent_stage_channel::{EventSource, ReplaySource, SocketChannel};
use agent_stage_core::config::{Config, LoggingConfig};
use agent_stage_core::types::AgentId;
use agent_stage_view::dom::{Element, Node};
use agent_stage_view::words::segments_to_nodes;
use agent_stage_view::{AgentViewController, LetterSplitter, MemoryDocument, TextSplitter, group_words};

#[derive(Parser)]
#[command(
    name = "agent-stage",
    about = "Animated multi-agent text stage driven by real-time events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a stage channel and drive the agent views
    Watch {
        /// Socket.IO server URL (default: from config)
        #[arg(long)]
        url: Option<String>,

        /// Agents on the stage, comma separated (default: from config)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,

        /// Print the rendered stage after every event
        #[arg(long)]
        print: bool,
    },

    /// Replay a JSON Lines event script through the controller
    Replay {
        /// Script path
        file: PathBuf,

        /// Honour the script's `at_ms` offsets
        #[arg(long)]
        realtime: bool,

        /// Agents on the stage, comma separated (default: from config)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,

        /// Print the rendered stage after every event
        #[arg(long)]
        print: bool,
    },

    /// Show the letter/word structure built for a text
    Split { text: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

/// Filter directives used when `RUST_LOG` is unset.
fn log_directives(logging: &LoggingConfig, verbose: bool) -> String {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };
    for filter in &logging.filters {
        directives.push(',');
        directives.push_str(filter);
    }
    directives
}

fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_directives(&logging, verbose)));

    let writer = if logging.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    }
}

fn stage_agents(config: &Config, agents: &[String]) -> Vec<AgentId> {
    if agents.is_empty() {
        config.document().agents
    } else {
        agents.iter().map(|a| AgentId::from(a.trim())).collect()
    }
}

/// How long to wait after a replay for the last transitions to finish.
fn settle_delay(config: &Config) -> Duration {
    Duration::from_millis(config.animation().fade_ms.saturating_add(50))
}

/// Run `source` through a controller on a fresh stage until it ends or Ctrl-C.
async fn drive(
    source: &dyn EventSource,
    config: &Config,
    agents: &[AgentId],
    print: bool,
) -> anyhow::Result<AgentViewController<MemoryDocument>> {
    let document = Arc::new(Mutex::new(MemoryDocument::with_agents(
        agents,
        &config.document(),
    )));
    let mut controller = AgentViewController::with_defaults(document.clone(), config);

    let (mut rx, handle) = source.start().await?;
    info!(source = source.id(), agents = agents.len(), "Stage ready");

    loop {
        tokio::select! {
            delivery = rx.recv() => {
                let Some(delivery) = delivery else { break };
                let event = delivery.event.name();
                let agent_id = delivery.event.agent_id().clone();
                controller.handle(delivery).await;
                info!(event, agent_id = %agent_id, "Event applied");
                if print {
                    println!("{}", document.lock().await.render_html());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    handle.shutdown();

    Ok(controller)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Watch { url, agents, print } => {
            let url = url.unwrap_or_else(|| config.channel_url());
            let channel = SocketChannel::new(
                url,
                Duration::from_millis(config.connect_timeout_ms()),
            )
            .with_namespace(config.channel_namespace());
            info!("Connecting to {} (namespace {})", channel.url(), channel.namespace());
            let agents = stage_agents(&config, &agents);
            let mut controller = drive(&channel, &config, &agents, print).await?;
            controller.shutdown();
        }
        Commands::Replay {
            file,
            realtime,
            agents,
            print,
        } => {
            let source = ReplaySource::new(file, realtime);
            let agents = stage_agents(&config, &agents);
            let mut controller = drive(&source, &config, &agents, print).await?;

            tokio::time::sleep(settle_delay(&config)).await;
            controller.shutdown();

            println!("{}", controller.document().lock().await.render_html());
            println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
        }
        Commands::Split { text } => {
            let names = config.document();
            let letters = LetterSplitter.split(&text);
            let segments = group_words(&letters);
            let mut root = Element::new("p");
            root.children = segments_to_nodes(&segments, &names);
            let words = root
                .children
                .iter()
                .filter_map(Node::as_element)
                .filter(|el| el.has_class(&names.word_class))
                .count();

            let mut doc = MemoryDocument::new();
            doc.append(root);
            println!("{}", doc.render_html());
            println!("{} letters, {words} words", letters.len());
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}
