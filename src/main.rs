//! Bedrock Assistant - server and command-line client
//!
//! A Minecraft Bedrock addon assistant backed by Gemini.

use anyhow::{bail, Context, Result};
use bedrock_assistant::chat::{data_uri, ChatAdapter, ChatRequest, Conversation};
use bedrock_assistant::Config;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bedrock-ai")]
#[command(about = "Minecraft Bedrock addon assistant")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "BEDROCK_AI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config.yaml / SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config.yaml / SERVER_HOST)
        #[arg(long)]
        host: Option<String>,
    },

    /// Ask a single question and stream the answer to stdout
    Ask {
        /// The question
        message: String,

        /// Image file to attach
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Interactive chat with a persisted conversation
    Chat {
        /// Conversation file (defaults to the user data directory)
        #[arg(long)]
        history_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the answer
    let default_filter = match cli.command {
        Commands::Serve { .. } => "info,bedrock_assistant=debug,tower_http=debug",
        _ => "warn",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if let Some(host) = host {
                config.server_host = host;
            }
            bedrock_assistant::start_server(config).await
        }
        Commands::Ask {
            message,
            image,
            model,
        } => {
            if let Some(model) = model {
                config.chat.model = model;
            }
            run_ask(&config, message, image.as_deref()).await
        }
        Commands::Chat { history_file } => {
            let path = match history_file {
                Some(path) => path,
                None => default_history_file()?,
            };
            run_chat(&config, &path).await
        }
    }
}

fn default_history_file() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("no data or home directory found; pass --history-file")?;
    Ok(base.join("bedrock-ai").join("conversation.json"))
}

async fn run_ask(config: &Config, message: String, image: Option<&Path>) -> Result<()> {
    let mut request = ChatRequest::new(message);
    if let Some(path) = image {
        let uri = data_uri::from_file(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        request = request.with_image(uri);
    }
    if !request.has_content() {
        bail!("nothing to ask: give a message or an image");
    }

    let adapter = bedrock_assistant::build_adapter(config)?;
    let mut relay = adapter.invoke_chat(&request).await?;

    let mut stdout = tokio::io::stdout();
    while let Some(item) = relay.next().await {
        let bytes = item?;
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn run_chat(config: &Config, path: &Path) -> Result<()> {
    let adapter = bedrock_assistant::build_adapter(config)?;
    let mut conversation = Conversation::load(path);
    let mut pending_image: Option<String> = None;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "Bedrock aí ({}). /new starts over, /image <path> attaches an image, /quit exits.\n",
                config.chat.model
            )
            .as_bytes(),
        )
        .await?;
    if !conversation.is_empty() {
        stdout
            .write_all(
                format!(
                    "Resuming conversation with {} message(s).\n",
                    conversation.messages().len()
                )
                .as_bytes(),
            )
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                conversation.clear();
                pending_image = None;
                conversation.save(path)?;
                stdout.write_all(b"Started a new chat.\n").await?;
                continue;
            }
            _ => {}
        }

        if let Some(image_path) = line.strip_prefix("/image ") {
            match data_uri::from_file(Path::new(image_path.trim())) {
                Ok(uri) => {
                    pending_image = Some(uri);
                    stdout
                        .write_all(b"Image attached to your next message.\n")
                        .await?;
                }
                Err(e) => {
                    stdout
                        .write_all(format!("Could not read image: {}\n", e).as_bytes())
                        .await?;
                }
            }
            continue;
        }

        conversation.push_user(line, pending_image.take())?;
        exchange(&adapter, &mut conversation, &mut stdout).await?;
        conversation.save(path)?;
    }

    conversation.save(path)?;
    Ok(())
}

/// Stream one model reply into the conversation and onto stdout.
async fn exchange(
    adapter: &ChatAdapter,
    conversation: &mut Conversation,
    stdout: &mut tokio::io::Stdout,
) -> Result<()> {
    let Some(request) = conversation.next_request() else {
        return Ok(());
    };
    let reply = conversation.begin_model_turn()?;

    let mut relay = match adapter.invoke_chat(&request).await {
        Ok(relay) => relay,
        Err(e) => {
            conversation.fail(&reply, &e.to_string())?;
            stdout
                .write_all(format!("{}\n", conversation_tail(conversation)).as_bytes())
                .await?;
            return Ok(());
        }
    };

    while let Some(item) = relay.next().await {
        match item {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                conversation.append_chunk(&reply, &text)?;
                stdout.write_all(&bytes).await?;
                stdout.flush().await?;
            }
            Err(e) => {
                conversation.fail(&reply, &e.to_string())?;
                stdout
                    .write_all(format!("\n{}\n", conversation_tail(conversation)).as_bytes())
                    .await?;
                return Ok(());
            }
        }
    }

    conversation.complete(&reply)?;
    stdout.write_all(b"\n").await?;
    Ok(())
}

fn conversation_tail(conversation: &Conversation) -> &str {
    conversation
        .messages()
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}
