//! Headless wallet host.
//!
//! Reads raw page messages from stdin, one JSON envelope per line, and
//! writes every script the host injects back into the page to stdout.
//! Lines starting with `:` drive the tab (`:navigate <url>`, `:reload`)
//! or the wallet (`:accounts`, `:switch <index>`, `:send <principal> <amount>`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use wallet_host::{AppState, HeadlessDialogs, HostConfig, MemoryLedger, ScriptInjector};

#[derive(Parser, Debug)]
#[command(version, about = "Headless host for the paca wallet bridge", long_about = None)]
struct Args {
    /// Config file (defaults to ~/.paca/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// How pending approvals are answered
    #[arg(long, value_enum, default_value_t = Decision::Approve)]
    decision: Decision,

    /// Hex-encoded 32-byte seed to import; a fresh account is created otherwise
    #[arg(long)]
    seed: Option<String>,

    /// Start without any wallet account
    #[arg(long, default_value_t = false)]
    no_wallet: bool,

    /// Credit the first account on the in-memory ledger
    #[arg(long, default_value_t = 0)]
    fund_e8s: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Decision {
    Approve,
    Reject,
}

/// Prints injected scripts for whatever drives the page.
struct StdoutInjector;

impl ScriptInjector for StdoutInjector {
    fn inject_javascript(&self, script: &str) {
        println!("{}", script.replace('\n', " "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = HostConfig::load(args.config.as_deref())?;

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    info!(
        ledger_url = %config.ledger_url,
        canister = %config.ledger_canister_id,
        "using in-memory ledger; network ledger settings are not contacted"
    );
    let ledger = Arc::new(MemoryLedger::new());
    let dialogs = Arc::new(HeadlessDialogs {
        confirm_answer: args.decision == Decision::Approve,
    });
    let state = AppState::new(config, ledger.clone(), Arc::new(StdoutInjector), dialogs)?;

    if !args.no_wallet {
        let account = {
            let mut wallet = state.wallet();
            match &args.seed {
                Some(seed) => wallet.import_seed(seed)?,
                None => wallet.create_account(),
            }
        };
        if args.fund_e8s > 0 {
            let identity = state.wallet().current().cloned();
            if let Some(identity) = identity {
                ledger.credit(&identity.account_identifier(), args.fund_e8s);
            }
        }
        info!(principal = %account.principal, address = %account.address, "wallet ready");
    }
    state.refresh_balances().await;
    info!(url = %state.current_url(), decision = ?args.decision, "host ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix(':') {
            run_command(&state, command).await;
            continue;
        }

        state.on_page_message(line).await;
        while let Some(view) = state.bridge.current_approval() {
            let approved = args.decision == Decision::Approve;
            info!(id = %view.id, kind = view.kind.as_str(), origin = %view.origin, approved, "{}", view.title);
            state.bridge.resolve_approval(&view.id, approved);
        }
    }

    // Let answers from approvals resolved on the last line reach stdout.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("stdin closed; shutting down");
    Ok(())
}

async fn run_command(state: &AppState, command: &str) {
    let (name, arg) = command
        .split_once(' ')
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "navigate" => match state.navigate(arg) {
            Ok(url) => info!(%url, "navigated"),
            Err(e) => warn!("navigation failed: {}", e),
        },
        "reload" => {
            let key = state.reload();
            info!(reload_key = key, "reloaded");
        }
        "accounts" => {
            state.refresh_balances().await;
            for account in state.wallet().snapshots() {
                println!("{}", serde_json::to_string(&account).unwrap_or_default());
            }
        }
        "switch" => {
            let result = arg
                .parse::<usize>()
                .map_err(anyhow::Error::from)
                .and_then(|index| state.wallet().switch_account(index));
            match result {
                Ok(account) => info!(label = %account.label, "switched account"),
                Err(e) => warn!("switch failed: {}", e),
            }
        }
        "send" => {
            let Some((recipient, amount)) = arg.split_once(' ') else {
                warn!("usage: :send <principal> <amount>");
                return;
            };
            match state.send_transfer(recipient, amount.trim()).await {
                Ok(height) => info!(?height, "transfer sent"),
                Err(e) => warn!("transfer failed: {}", e),
            }
        }
        other => warn!(command = other, "unknown command"),
    }
}
