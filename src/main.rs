use bookstate::cli::chapters::ChaptersCommands;
use bookstate::cli::decisions::DecisionsCommands;
use bookstate::cli::validate::ValidateCommands;
use bookstate::context::Completion;
use bookstate::models::CheckpointType;
use bookstate::state::InitOptions;
use bookstate::{Result, StateContext};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bookstate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable state engine for interruptible generation workflows", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project root holding bookstate.toml (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new generation
    Init {
        /// Interactive decisions
        #[arg(long)]
        interactive: bool,

        /// Detail level preference
        #[arg(long)]
        detail_level: Option<String>,

        /// Iteration cap per section
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Show the current phase and status
    Status,

    /// Take a checkpoint of the current state
    Checkpoint {
        #[arg(short, long, default_value = "Manual checkpoint")]
        description: String,

        /// MANUAL, AUTO, PHASE_TRANSITION, EMERGENCY or ERROR
        #[arg(short = 't', long = "type", default_value = "MANUAL")]
        checkpoint_type: CheckpointType,
    },

    /// List checkpoints, oldest first
    Checkpoints {
        /// Only the newest N
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete all but the newest checkpoints
    Cleanup {
        /// Number to keep (defaults to MAX_CHECKPOINTS)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Restore the newest checkpoint
    Resume,

    /// Bring the state back to a usable condition after a crash
    Recover {
        /// Report consistency problems without repairing them
        #[arg(long)]
        no_fix: bool,
    },

    /// Run validators
    #[command(subcommand)]
    Validate(ValidateCommands),

    /// Summarize outputs and completed sections per chapter
    Report,

    /// Pending and resolved decisions
    #[command(subcommand)]
    Decisions(DecisionsCommands),

    /// Chapter structure used by coverage and report
    #[command(subcommand)]
    Chapters(ChaptersCommands),

    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = bookstate::logging::init_tracing(cli.log_json) {
        eprintln!("{}", format!("Warning: logging unavailable: {}", e).yellow());
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to create tokio runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    match runtime.block_on(run_async(cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    }
}

async fn run_async(cli: Cli) -> Result<bool> {
    if let Commands::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "bookstate", &mut io::stdout());
        return Ok(true);
    }

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let ctx = Arc::new(StateContext::load(&root)?);
    let command = {
        let ctx = Arc::clone(&ctx);
        async move { dispatch(&ctx, cli.command).await }
    };

    match ctx.run_guarded(command, shutdown_signal()).await? {
        Completion::Finished(valid) => {
            ctx.store.stop_autosave().await;
            Ok(valid)
        }
        Completion::Interrupted {
            result,
            checkpoint_id,
        } => {
            eprintln!("{}", "⚠️  Interrupted, state saved".yellow());
            if let Err(e) = result {
                eprintln!("{}", format!("Error: {}", e).red());
            }
            if let Some(checkpoint_id) = checkpoint_id {
                eprintln!("{}", format!("📌 Checkpoint: {}", checkpoint_id).green());
            }
            Ok(true)
        }
    }
}

async fn dispatch(ctx: &StateContext, command: Commands) -> Result<bool> {
    use bookstate::cli;

    match command {
        Commands::Init {
            interactive,
            detail_level,
            max_iterations,
        } => {
            let options = InitOptions {
                interactive,
                detail_level,
                max_iterations_per_section: max_iterations,
            };
            cli::init::run(ctx, options).await
        }
        Commands::Status => cli::status::run(ctx).await,
        Commands::Checkpoint {
            description,
            checkpoint_type,
        } => cli::checkpoint::create(ctx, &description, checkpoint_type).await,
        Commands::Checkpoints { limit } => cli::checkpoint::list(ctx, limit).await,
        Commands::Cleanup { keep } => cli::checkpoint::cleanup(ctx, keep).await,
        Commands::Resume => cli::checkpoint::resume(ctx).await,
        Commands::Recover { no_fix } => cli::recover::run(ctx, !no_fix).await,
        Commands::Validate(cmd) => cli::validate::run(ctx, cmd).await,
        Commands::Report => cli::report::run(ctx).await,
        Commands::Decisions(cmd) => cli::decisions::run(ctx, cmd).await,
        Commands::Chapters(cmd) => cli::chapters::run(ctx, cmd),
        Commands::Completions { .. } => Ok(true),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
