//! # context-relay CLI (`relay`)
//!
//! The `relay` binary runs the gateway and provides small operational
//! commands around it.
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve` | Start the gateway HTTP server |
//! | `relay corpus` | List the knowledge corpus entries |
//! | `relay ask "<question>"` | One-shot question through the retrieval pipeline |
//!
//! ## Examples
//!
//! ```bash
//! # Start the gateway
//! relay serve --config ./config/relay.toml
//!
//! # Inspect what the corpus contains
//! relay corpus
//!
//! # Ask a question from the terminal, with and without corpus context
//! relay ask "What does onboarding look like?"
//! relay ask "What does onboarding look like?" --no-context
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use context_relay::config::{self, Config};
use context_relay::corpus::Corpus;
use context_relay::embedding::HttpEmbedder;
use context_relay::index::KnowledgeIndex;
use context_relay::models::{ChatMessage, Role};
use context_relay::prompt;
use context_relay::retrieval;
use context_relay::server;
use context_relay::text::truncate_chars;
use context_relay::upstream::{UpstreamClient, UpstreamPayload};

/// context-relay: a retrieval-augmented chat gateway for LLM providers.
#[derive(Parser)]
#[command(
    name = "relay",
    about = "context-relay — a retrieval-augmented chat gateway for LLM providers",
    version,
    long_about = "context-relay sits between a client application and an LLM provider, enriching \
    conversations with context retrieved from a fixed knowledge corpus before forwarding them \
    upstream, and relaying buffered or streamed replies back to the caller."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the gateway HTTP server.
    ///
    /// Binds to `[server].bind`, loads the corpus, and serves the chat
    /// endpoint until the process is terminated.
    Serve,

    /// List the knowledge corpus entries.
    ///
    /// Useful to verify what the gateway can retrieve before starting it.
    Corpus,

    /// Ask a one-shot question through the retrieval pipeline.
    ///
    /// Runs the same path as a buffered chat request: retrieval, prompt
    /// assembly, and a single completion call.
    Ask {
        /// The question to send.
        question: String,

        /// Skip corpus retrieval and send the question as-is.
        #[arg(long)]
        no_context: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&config).await,
        Commands::Corpus => run_corpus(&config),
        Commands::Ask {
            question,
            no_context,
        } => run_ask(&config, &question, no_context).await,
    }
}

fn run_corpus(config: &Config) -> Result<()> {
    let corpus = Corpus::from_path(&config.corpus.path)?;

    println!("corpus: {} entries", corpus.len());
    for entry in corpus.entries() {
        let text = entry.text();
        println!(
            "  {} — {} ({} chars)",
            entry.topic,
            excerpt(&entry.summary, 60),
            text.chars().count()
        );
    }

    Ok(())
}

async fn run_ask(config: &Config, question: &str, no_context: bool) -> Result<()> {
    let api_key = std::env::var(&config.provider.api_key_env)
        .map_err(|_| anyhow!("{} environment variable not set", config.provider.api_key_env))?;

    let corpus = Corpus::from_path(&config.corpus.path)?;
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let embedder = HttpEmbedder::new(client.clone(), &config.provider, api_key.clone());
    let upstream = UpstreamClient::new(client, &config.provider, api_key);
    let index = KnowledgeIndex::new(corpus, config.retrieval.max_input_chars);

    let results = if no_context {
        Vec::new()
    } else {
        match retrieval::retrieve(&index, &embedder, question, &config.retrieval).await {
            Ok(results) => results,
            Err(err) => {
                eprintln!("Warning: retrieval unavailable: {err}");
                Vec::new()
            }
        }
    };

    if !results.is_empty() {
        println!("matched context:");
        for result in &results {
            println!("  [{:.2}] {}", result.score, result.topic);
        }
        println!();
    }

    let system_prompt =
        prompt::build_system_prompt(None, &results, config.retrieval.max_context_chars);
    let history = vec![ChatMessage {
        role: Role::User,
        content: question.to_string(),
    }];
    let payload = UpstreamPayload::new(
        config.provider.chat_model.clone(),
        config.upstream.temperature,
        config.upstream.max_tokens,
        false,
        system_prompt,
        history,
        config.retrieval.max_history,
    );

    let reply = upstream.complete(&payload).await?;
    println!("{}", reply.reply);

    Ok(())
}

fn excerpt(s: &str, max: usize) -> String {
    let cut = truncate_chars(s.trim(), max);
    if cut.len() < s.trim().len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}
