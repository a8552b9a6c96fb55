use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use claw_agent::ApprovalStore;
use claw_gateway::channels::TelegramBridge;
use claw_gateway::config::{load_config, resolve_config_path, CONFIG_ENV};
use claw_gateway::{doctor, Gateway, GatewayClient};
use claw_types::config::ClawConfig;
use claw_types::protocol::SendRequest;

#[derive(Parser)]
#[command(name = "claw", version, about = "claw: a personal assistant gateway")]
struct Cli {
    /// Config file (default ~/.claw/claw.toml)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server
    Gateway {
        #[command(subcommand)]
        action: GatewayAction,
    },
    /// Talk to an agent
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Manage tool approvals
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Run the Telegram bridge
    Telegram {
        #[command(subcommand)]
        action: TelegramAction,
    },
    /// Check the configuration and prepare directories
    Doctor,
    /// Show current status
    Status,
}

#[derive(Subcommand)]
enum GatewayAction {
    Run,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Send one message and print the reply
    Send {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value = "local")]
        peer: String,
        /// Run the turn in this process and prompt for tool approvals
        #[arg(long)]
        local: bool,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    List {
        #[arg(long)]
        agent: String,
    },
    View {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        session: String,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// Approve a tool for every channel
    Allow { tool: String },
    /// Print approved tools
    List,
}

#[derive(Subcommand)]
enum TelegramAction {
    Run,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path);
    init_logging(
        config
            .as_ref()
            .map(|c| c.gateway.log_level.as_str())
            .unwrap_or("info"),
    );
    let config = config?;

    match cli.command {
        Commands::Gateway {
            action: GatewayAction::Run,
        } => Arc::new(Gateway::new(config)).run().await,

        Commands::Agent {
            action:
                AgentAction::Send {
                    agent,
                    message,
                    session,
                    peer,
                    local,
                },
        } => {
            let req = SendRequest {
                agent_id: agent,
                message,
                session_id: session,
                channel: "cli".to_string(),
                peer,
            };
            let resp = if local {
                Gateway::new(config).send_with(&req, true).await?
            } else {
                GatewayClient::from_config(&config.gateway)
                    .send_message(&req)
                    .await?
            };
            info!("Reply in session {}", resp.session_id);
            println!("{}", resp.assistant_message);
            Ok(())
        }

        Commands::Sessions { action } => {
            let gw = Gateway::new(config);
            match action {
                SessionsAction::List { agent } => {
                    for s in gw.list_sessions(&agent)? {
                        println!("{}\t{}", s.id, s.title);
                    }
                }
                SessionsAction::View { agent, session } => {
                    for event in gw.read_events(&agent, &session)? {
                        println!("[{}] {}", event.role(), event.content_text());
                    }
                }
            }
            Ok(())
        }

        Commands::Tools { action } => {
            let approvals = ApprovalStore::new(config.tools.approvals_path.clone());
            match action {
                ToolsAction::Allow { tool } => {
                    approvals.allow(&tool)?;
                    println!("Approved tool {tool}");
                }
                ToolsAction::List => {
                    for tool in approvals.load()? {
                        println!("{tool}");
                    }
                }
            }
            Ok(())
        }

        Commands::Telegram {
            action: TelegramAction::Run,
        } => TelegramBridge::from_config(&config)?.run().await,

        Commands::Doctor => {
            let problems = doctor::run(&config)?;
            if problems.is_empty() {
                println!("OK: {}", config_path.display());
                return Ok(());
            }
            for p in &problems {
                println!("- {p}");
            }
            anyhow::bail!("{} problem(s) found in {}", problems.len(), config_path.display())
        }

        Commands::Status => {
            print_status(&config, &config_path);
            Ok(())
        }
    }
}

fn print_status(config: &ClawConfig, config_path: &std::path::Path) {
    println!("claw v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", config_path.display());
    println!("Gateway: {}:{}", config.gateway.host, config.gateway.port);
    for agent in &config.agents {
        println!("Agent: {} ({}, {} via {})", agent.id, agent.name, agent.model, agent.provider);
    }
    let key_set = std::env::var("OPENAI_API_KEY").is_ok() || config.llm.openai.api_key.is_some();
    println!("API Key: {}", if key_set { "configured" } else { "not set" });
    println!("Storage: {}", config.storage.base_path.display());
    println!("Approvals: {}", config.tools.approvals_path.display());
    println!(
        "Telegram: {}",
        if config.telegram.is_some() { "configured" } else { "not configured" }
    );
}
