//! ledger - event-sourced account ledger
//!
//! Opens the configured backends, rebuilds the read model from the log and
//! serves a small line-oriented command shell on stdin. Every reply is one
//! line of JSON.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger::{Config, ConfiguredLedger, EventLog, Ledger, LedgerError, SnapshotStore};

const HELP: &str = "commands: open <owner> [initial_balance] [account_id] | deposit <id> <amount> | \
withdraw <id> <amount> | close <id> | state <id> | get <id> | list | rebuild | events [id] | help | quit";

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger=debug".into());

    // Logs go to stderr so stdout carries only replies.
    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(storage = ?config.storage, "Starting ledger");

    let ledger = Ledger::open(&config).await?;
    let replayed = ledger.rebuild_projections().await?;
    tracing::info!(events = replayed, "Projections ready");

    tokio::select! {
        result = run_shell(&ledger) => result?,
        _ = shutdown_signal() => {}
    }

    tracing::info!("Ledger shutting down. Goodbye!");
    Ok(())
}

/// Read commands from stdin until EOF or `quit`
async fn run_shell(ledger: &ConfiguredLedger) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let command = match ShellCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(command)) => command,
            Err(message) => {
                write_reply(&mut stdout, &json!({ "error": "usage", "message": message })).await?;
                continue;
            }
        };

        let reply = match execute(ledger, command).await {
            Ok(value) => value,
            Err(e) => json!({ "error": e.code(), "message": e.to_string() }),
        };
        write_reply(&mut stdout, &reply).await?;
    }

    Ok(())
}

async fn write_reply(stdout: &mut tokio::io::Stdout, reply: &Value) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(reply)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Open {
        owner: String,
        initial_balance: Option<Decimal>,
        account_id: Option<String>,
    },
    Deposit(String, Decimal),
    Withdraw(String, Decimal),
    Close(String),
    State(String),
    Get(String),
    List,
    Rebuild,
    Events(Option<String>),
    Help,
    Quit,
}

impl ShellCommand {
    /// `Ok(None)` for blank lines and comments
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        if verb.starts_with('#') {
            return Ok(None);
        }

        let args: Vec<&str> = words.collect();
        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("open", [owner, rest @ ..]) if rest.len() <= 2 => ShellCommand::Open {
                owner: owner.to_string(),
                initial_balance: rest.first().map(|raw| decimal(raw)).transpose()?,
                account_id: rest.get(1).map(|id| id.to_string()),
            },
            ("deposit", [id, amount]) => ShellCommand::Deposit(id.to_string(), decimal(amount)?),
            ("withdraw", [id, amount]) => ShellCommand::Withdraw(id.to_string(), decimal(amount)?),
            ("close", [id]) => ShellCommand::Close(id.to_string()),
            ("state", [id]) => ShellCommand::State(id.to_string()),
            ("get", [id]) => ShellCommand::Get(id.to_string()),
            ("list", []) => ShellCommand::List,
            ("rebuild", []) => ShellCommand::Rebuild,
            ("events", []) => ShellCommand::Events(None),
            ("events", [id]) => ShellCommand::Events(Some(id.to_string())),
            ("help", _) => ShellCommand::Help,
            ("quit" | "exit", []) => ShellCommand::Quit,
            _ => return Err(HELP.to_string()),
        };

        Ok(Some(command))
    }
}

fn decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|e| format!("invalid amount '{raw}': {e}"))
}

async fn execute<L: EventLog, S: SnapshotStore>(
    ledger: &Ledger<L, S>,
    command: ShellCommand,
) -> Result<Value, LedgerError> {
    let value = match command {
        ShellCommand::Open {
            owner,
            initial_balance,
            account_id,
        } => {
            let events = ledger
                .open_account(&owner, initial_balance, account_id.as_deref())
                .await?;
            json!({ "events": events })
        }
        ShellCommand::Deposit(id, amount) => json!({ "events": ledger.deposit(&id, amount).await? }),
        ShellCommand::Withdraw(id, amount) => json!({ "events": ledger.withdraw(&id, amount).await? }),
        ShellCommand::Close(id) => json!({ "events": ledger.close_account(&id).await? }),
        ShellCommand::State(id) => json!({ "state": ledger.account_state(&id).await? }),
        ShellCommand::Get(id) => json!({ "projection": ledger.projection(&id) }),
        ShellCommand::List => json!({ "projections": ledger.list_projections() }),
        ShellCommand::Rebuild => json!({ "events": ledger.rebuild_projections().await? }),
        ShellCommand::Events(Some(id)) => json!({ "events": ledger.events(&id).await? }),
        ShellCommand::Events(None) => json!({ "events": ledger.all_events().await? }),
        ShellCommand::Help => json!({ "help": HELP }),
        ShellCommand::Quit => Value::Null,
    };

    Ok(value)
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
