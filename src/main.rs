mod cli;
mod config;
mod error;
mod fal_client;
mod gateway;
mod gemini_client;
mod payload;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::session::Conversation;
use crate::cli::chat::{ChatContext, ChatOptions};
use crate::config::{Config, WelcomeTiming};
use crate::fal_client::FalClient;
use crate::gemini_client::GeminiClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: ChatArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat(ChatArgs),
}

#[derive(Args)]
struct ChatArgs {
    /// Generate one image from this prompt and exit
    #[arg(short, long)]
    input: Option<String>,

    /// Where to write the image generated from --input
    #[arg(short, long, requires = "input")]
    output: Option<PathBuf>,

    /// Gemini model used for images and suggestions
    #[arg(long)]
    image_model: Option<String>,

    /// fal model used for image-to-video
    #[arg(long)]
    video_model: Option<String>,

    /// Skip the delays of the welcome script
    #[arg(long)]
    no_welcome: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Chat(args)) => args,
        // Default to chat if no subcommand is provided
        None => cli.options,
    };

    let log_level = if args.verbose { Level::DEBUG } else { Level::WARN };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Some(model) = args.image_model {
        config.gemini.model = model;
    }
    if let Some(model) = args.video_model {
        config.fal.model = model;
    }

    let gemini = GeminiClient::new(config.gemini);
    let fal = FalClient::new(config.fal);
    info!("Starting imagen chat with {} and {}", gemini.model(), fal.model());

    let conversation = Conversation::new(Arc::new(gemini), Arc::new(fal));
    let welcome = if args.no_welcome {
        WelcomeTiming::instant()
    } else {
        config.welcome
    };

    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        conversation,
        ChatOptions {
            input: args.input,
            save_to: args.output,
            welcome,
        },
    );
    chat_context.run().await
}
