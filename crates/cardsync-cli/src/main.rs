mod cmd;
mod exit;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cardsync",
    about = "Keep work-item cards in sync with their tracker issues, pull requests and sub-issues",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .cards/ or .git/)
    #[arg(long, global = true, env = "CARDSYNC_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .cards/ and a default config in the current project
    Init,

    /// List cards
    List {
        /// Include archived cards
        #[arg(long)]
        archived: bool,
    },

    /// Show one card
    Show { id: String },

    /// Plan (and with --execute, apply) a reconciliation pass for a card
    Reconcile {
        id: String,

        /// Apply the plan instead of only printing it
        #[arg(long)]
        execute: bool,

        /// Status to advance the card to (must be the next one)
        #[arg(long, value_name = "STATUS")]
        to: Option<String>,

        /// Which side wins on status drift: document or tracker
        #[arg(long)]
        authority: Option<String>,
    },

    /// Record the tracker number of a declared sub-issue
    Link {
        id: String,
        #[arg(long)]
        tag: String,
        #[arg(long)]
        number: u64,
    },

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::List { archived } => cmd::card::list(&root, archived, cli.json),
        Commands::Show { id } => cmd::card::show(&root, &id, cli.json),
        Commands::Reconcile {
            id,
            execute,
            to,
            authority,
        } => cmd::reconcile::run(
            &root,
            &id,
            execute,
            to.as_deref(),
            authority.as_deref(),
            cli.json,
        ),
        Commands::Link { id, tag, number } => cmd::card::link(&root, &id, &tag, number, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit::code(&e));
    }
}
