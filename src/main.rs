// src/main.rs
// Interactive console front-end over the chat engine

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tutor_engine::chat::ChatEvent;
use tutor_engine::config::EngineConfig;
use tutor_engine::llm::generator::GeneratorConfig;
use tutor_engine::llm::{OpenAiEmbeddings, OpenAiGenerator};
use tutor_engine::memory::QdrantIndex;
use tutor_engine::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "tutor-engine", about = "Memory-augmented tutoring chat")]
struct Cli {
    /// User id for this session.
    #[arg(long, env = "TUTOR_USER", default_value = "local")]
    user: String,

    /// Resume an existing conversation instead of starting fresh.
    #[arg(long)]
    conversation: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let state = build_state(config).await?;
    info!("engine ready");

    run_repl(state, cli).await
}

async fn build_state(config: EngineConfig) -> Result<Arc<AppState>> {
    let http = reqwest::Client::new();

    let generator = Arc::new(OpenAiGenerator::new(
        http.clone(),
        GeneratorConfig {
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens as usize,
        },
    ));

    let embeddings = Arc::new(OpenAiEmbeddings::new(
        http,
        config.embedding_base_url.clone(),
        config.embedding_key().to_string(),
        config.embedding_model.clone(),
        config.embedding_dim,
    ));

    let index = Arc::new(
        QdrantIndex::connect(
            &config.qdrant_url,
            &config.qdrant_collection,
            config.embedding_dim,
        )
        .await?,
    );

    let options: SqliteConnectOptions = config
        .database_url
        .parse::<SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.sqlite_max_connections)
        .connect_with(options)
        .await
        .context("failed to open SQLite database")?;

    Ok(AppState::build(config, generator, embeddings, index, pool).await?)
}

async fn run_repl(state: Arc<AppState>, cli: Cli) -> Result<()> {
    let mut conversation = cli.conversation;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("tutor-engine (user: {}). /list, /delete <id>, /quit", cli.user);
    prompt_marker()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        match line.as_str() {
            "" => {}
            "/quit" | "/exit" => break,
            "/list" => {
                for conv in state.registry.list(&cli.user).await? {
                    println!("{}  {}  {}", conv.id, conv.updated_at.to_rfc3339(), conv.title);
                }
            }
            _ if line.starts_with("/delete ") => {
                let id = line["/delete ".len()..].trim();
                match state.registry.delete(id, &cli.user).await {
                    Ok(()) => {
                        println!("deleted {}", id);
                        if conversation.as_deref() == Some(id) {
                            conversation = None;
                        }
                    }
                    Err(e) => eprintln!("delete failed: {}", e),
                }
            }
            _ => {
                stream_turn(&state, &cli.user, &mut conversation, &line).await;
            }
        }
        prompt_marker()?;
    }

    Ok(())
}

/// Stream one turn to stdout; Ctrl-C while streaming cancels the turn.
async fn stream_turn(
    state: &AppState,
    user: &str,
    conversation: &mut Option<String>,
    text: &str,
) {
    let cancel = CancellationToken::new();
    let mut stream = match state
        .chat
        .stream_message(user, conversation.as_deref(), text, cancel.clone())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("error: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                println!("\n[cancelled]");
                return;
            }
            event = stream.next() => match event {
                Some(ChatEvent::Chunk { text }) => {
                    print!("{}", text);
                    let _ = std::io::stdout().flush();
                }
                Some(ChatEvent::Done { conversation_id }) => {
                    println!();
                    *conversation = Some(conversation_id);
                    return;
                }
                Some(ChatEvent::Error { message }) => {
                    eprintln!("\nerror: {}", message);
                    return;
                }
                None => return,
            }
        }
    }
}

fn prompt_marker() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
