use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use branchat::prelude::*;
use branchat::FileUpload;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "branchat-ask")]
#[command(about = "Ask a question on a branching canvas and stream the answer", long_about = None)]
struct Cli {
    /// Root question; ignored when files are given
    question: Option<String>,

    /// Files to analyze instead of asking a root question
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Follow-up question asked from the first answer
    #[arg(long)]
    follow_up: Option<String>,

    /// Part of the first answer the follow-up is about
    #[arg(long, requires = "follow_up")]
    anchor: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);

    let model = config.model.selection()?;
    let registry = config.registry();
    // Keyless providers always register, so check the one actually selected
    if let Err(e) = registry.get(model.provider) {
        let key = model.provider.descriptor().api_key_env.unwrap_or("its API key");
        bail!("{}; set {} or select another provider", e, key);
    }
    tracing::info!(providers = ?registry.providers(), model = %model, "providers ready");

    let canvas = Canvas::builder()
        .registry(registry)
        .config(config.canvas.clone())
        .build()?;

    // A second, canvas-wide view next to the per-card printer
    let mut overview = canvas.subscribe_all();

    let session = if cli.files.is_empty() {
        let Some(question) = cli.question.as_deref() else {
            bail!("Pass a question or at least one --file");
        };
        canvas.ask_initial(question, model.clone())?
    } else {
        let uploads: Vec<_> = cli.files.iter().map(FileUpload::from_path).collect();
        let outcome = canvas.ingest_files(&uploads, model.clone()).await?;
        for failure in &outcome.failures {
            eprintln!("skipped: {}", failure);
        }
        match outcome.session {
            Some(session) => session,
            None => bail!("None of the files could be read"),
        }
    };

    let first = session.node_id().to_string();
    print_answer(&canvas, session).await?;

    if let Some(follow_up) = cli.follow_up.as_deref() {
        println!();
        let session = canvas.ask_follow_up(&first, follow_up, cli.anchor.as_deref(), model)?;
        print_answer(&canvas, session).await?;
    }

    let snapshot = canvas.snapshot();
    tracing::info!(
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        updates = overview.drain().len(),
        "done"
    );

    canvas.dispose();
    Ok(())
}

/// Stream one session's answer to stdout as it arrives
async fn print_answer(canvas: &Canvas, session: SessionHandle) -> anyhow::Result<()> {
    let node = canvas
        .node(session.node_id())
        .context("Session node disappeared")?;
    println!("## {}\n", node.label);

    let mut card = canvas.subscribe(session.node_id());
    let wait = session.wait();
    tokio::pin!(wait);

    let mut printed = 0;
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            Some(update) = card.recv() => {
                if update.state == SessionState::Streaming {
                    print_delta(&update.text, &mut printed);
                }
            }
        }
    };

    match outcome.context("Answer failed")? {
        SessionOutcome::Completed(text) => {
            print_delta(&text, &mut printed);
            println!();
            Ok(())
        }
        SessionOutcome::Cancelled => bail!("Answer was cancelled"),
    }
}

/// Print what `text` adds past the first `printed` bytes
fn print_delta(text: &str, printed: &mut usize) {
    if let Some(delta) = text.get(*printed..) {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
        *printed = text.len();
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
