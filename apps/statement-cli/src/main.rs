//! statement-import binary
//!
//! Entry point for importing a bank statement from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use statement_cli::{
    run_import, run_transactions, DirectoryPreviewHost, ImportOptions, RedactionPlan,
    TransactionEdits,
};
use statement_client::{ClientConfig, HttpStatementApi};
use statement_core::{parse_page_list, MemoryPreviewHost, PreviewHost, WorkflowStore};
use statement_redact::LopdfRedactor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "statement-import")]
#[command(version, about = "Import transactions from a bank statement PDF")]
struct Args {
    /// API base URL (overrides STATEMENT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token (overrides STATEMENT_API_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract transactions from selected pages of a statement
    Import {
        /// Statement PDF
        file: PathBuf,

        /// Pages to submit, in order, e.g. "2,5,3" or "1-3"
        #[arg(short, long)]
        pages: String,

        /// JSON file with regions to redact per page
        #[arg(long)]
        redactions: Option<PathBuf>,

        /// Write page previews into this directory
        #[arg(long)]
        previews_dir: Option<PathBuf>,

        /// JSON file with field edits per transaction position
        #[arg(long)]
        edits: Option<PathBuf>,

        /// Commit the reviewed transactions
        #[arg(long)]
        commit: bool,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the transactions already stored for the user
    Transactions {
        /// Write the transactions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Reports go to stdout, logs to stderr
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.api_url {
        config = config.with_base_url(url);
    }
    if let Some(token) = &args.token {
        config = config.with_token(token);
    }
    tracing::info!("statement-import v{} using {}", env!("CARGO_PKG_VERSION"), config.base_url);

    let api = Arc::new(HttpStatementApi::new(config)?);

    match args.command {
        Command::Import {
            file,
            pages,
            redactions,
            previews_dir,
            edits,
            commit,
            output,
        } => {
            let pages = parse_page_list(&pages).map_err(|e| anyhow!("Invalid --pages: {}", e))?;
            let previews: Arc<dyn PreviewHost> = match &previews_dir {
                Some(dir) => Arc::new(
                    DirectoryPreviewHost::new(dir)
                        .with_context(|| format!("Cannot create {}", dir.display()))?,
                ),
                None => Arc::new(MemoryPreviewHost::new()),
            };
            let options = ImportOptions {
                file,
                pages,
                load_previews: previews_dir.is_some(),
                redactions: redactions.as_deref().map(RedactionPlan::load).transpose()?,
                edits: edits.as_deref().map(TransactionEdits::load).transpose()?,
                commit,
            };

            let store = WorkflowStore::new(api, Arc::new(LopdfRedactor::new()), previews);
            let report = run_import(&store, options).await?;
            write_json(&report, output.as_deref())?;
        }
        Command::Transactions { output } => {
            let store = WorkflowStore::new(
                api,
                Arc::new(LopdfRedactor::new()),
                Arc::new(MemoryPreviewHost::new()),
            );
            let statement = run_transactions(&store).await?;
            write_json(&statement, output.as_deref())?;
        }
    }

    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
