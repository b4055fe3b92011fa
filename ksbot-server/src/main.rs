use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ksbot_core::storage::{clear_history, CodeLedger};
use ksbot_core::{Code, RunOutcome, StoragePaths};

mod context;
use context::BotContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "ksbot")]
#[command(author, version, about = "ksbot - gift code redeemer for a list of players")]
struct Args {
    /// Directory holding players.csv, ks_codes.txt, results.csv and config.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Check for new codes every CHECK_INTERVAL seconds until Ctrl-C (default)
    Run,
    /// One discovery pass; new codes are redeemed right away
    Check,
    /// Redeem now. Codes given here are tracked and announced when settled;
    /// with none, every tracked code is announced.
    Redeem { codes: Vec<String> },
    /// Append a player id to players.csv
    AddPlayer { id: String },
    /// Forget all tracked codes and results
    ClearHistory {
        #[arg(long)]
        yes: bool,
    },
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ksbot"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing(log_path: &Path) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("ksbot=info".parse().unwrap_or_default());
    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let paths = StoragePaths::new(&data_dir);
    init_tracing(&paths.log)?;
    info!("ksbot starting. data_dir={}", data_dir.display());

    if let Err(e) = dispatch(args.command.unwrap_or(Command::Run), paths).await {
        error!("ksbot error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn dispatch(command: Command, paths: StoragePaths) -> anyhow::Result<()> {
    match command {
        Command::AddPlayer { id } => {
            let ctx = BotContext::new(paths).await?;
            if !ctx.players.add_player(&id).await? {
                warn!("Player {} not added.", id);
            }
        }
        Command::ClearHistory { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear history without --yes");
            }
            clear_history(&paths).await?;
        }
        Command::Check => {
            let ctx = BotContext::new(paths).await?;
            let cancel = cancel_on_ctrl_c();
            let added = ctx.auto_check.check_now(&cancel).await?;
            info!("Discovery pass done; {} new code(s).", added.len());
        }
        Command::Redeem { codes } => {
            let ctx = BotContext::new(paths).await?;
            let trigger = manual_trigger(&ctx.paths, codes).await?;
            let cancel = cancel_on_ctrl_c();
            let outcome = ctx.auto_check.redeem_now(&trigger, &cancel).await?;
            report(&outcome);
        }
        Command::Run => {
            let ctx = BotContext::new(paths).await?;
            ctx.auto_check.start(ctx.config.check_interval()).await;
            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received; stopping auto-check.");
            ctx.auto_check.stop().await;
        }
    }
    Ok(())
}

/// Codes named on the command line are added to the ledger and become the
/// announced batch; otherwise the whole ledger is.
async fn manual_trigger(paths: &StoragePaths, raw: Vec<String>) -> anyhow::Result<Vec<Code>> {
    let mut ledger = CodeLedger::load(&paths.codes).await?;
    if raw.is_empty() {
        return Ok(ledger.codes().to_vec());
    }
    let requested: Vec<Code> = raw
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(Code::from)
        .collect();
    let added = ledger.append(&requested).await?;
    for code in &added {
        info!("Tracking code {} from the command line", code);
    }
    Ok(requested)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; stopping after the current player.");
            on_signal.cancel();
        }
    });
    cancel
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::AlreadyRunning => info!("Another run is in progress; nothing done."),
        RunOutcome::Completed(s) | RunOutcome::Cancelled(s) => info!(
            "Attempted {} code(s); {} player(s) processed, {} skipped, {} failed.",
            s.attempted.len(),
            s.players_processed,
            s.players_skipped,
            s.players_failed
        ),
    }
}
