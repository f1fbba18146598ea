use anyhow::{Context, Result, bail};
use eventdesk_lib::{AppConfig, AppState, QueueCounts, SyncQueueId, SyncQueueItem, init_logging};
use serde::Serialize;
use std::env;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    List,
    Flush,
    Retry(String),
    ClearSynced,
    Scan(String),
}

#[derive(Debug, Clone)]
struct CliOptions {
    command: Command,
    pretty: bool,
    database_url: Option<String>,
    gateway_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    database_url: String,
    gateway_url: String,
    counts: QueueCounts,
    oldest_pending: Option<SyncQueueItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearReport {
    removed: usize,
}

fn usage() -> &'static str {
    "Usage: eventdesk_sync <status|list|flush|retry <id>|clear-synced|scan <credential>> [--pretty] [--database-url <url>] [--gateway-url <url>]"
}

fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let payload = rt.block_on(run(&options))?;
    println!("{payload}");
    Ok(())
}

async fn run(options: &CliOptions) -> Result<String> {
    let mut config = AppConfig::from_env();
    if let Some(url) = &options.database_url {
        config.database.url = url.clone();
    }
    if let Some(url) = &options.gateway_url {
        config.gateway.base_url = url.clone();
    }
    // 単発実行なのでリトライはキューに残し、次回の flush に任せる
    config.sync.auto_sync = false;

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;
    let queue = &state.sync_queue;

    let payload = match &options.command {
        Command::Status => {
            let counts = queue.counts().await?;
            let oldest_pending = queue
                .get_sync_queue()
                .await?
                .into_iter()
                .find(SyncQueueItem::is_pending);
            to_json(
                &StatusReport {
                    database_url: state.config.database.url.clone(),
                    gateway_url: state.config.gateway.base_url.clone(),
                    counts,
                    oldest_pending,
                },
                options.pretty,
            )
        }
        Command::List => to_json(&queue.get_sync_queue().await?, options.pretty),
        Command::Flush => to_json(&queue.flush().await?, options.pretty),
        Command::Retry(id) => {
            let item_id = SyncQueueId::new(id.clone()).map_err(anyhow::Error::msg)?;
            let report = queue
                .retry(&item_id)
                .await
                .with_context(|| format!("Failed to retry sync item {id}"))?;
            to_json(&report, options.pretty)
        }
        Command::ClearSynced => {
            let removed = queue.clear_synced().await?;
            to_json(&ClearReport { removed }, options.pretty)
        }
        Command::Scan(credential) => {
            let outcome = state
                .scan_pipeline
                .process_credential(credential)
                .await
                .context("Scan failed")?;
            to_json(&outcome, options.pretty)
        }
    };

    state.shutdown().await;
    payload
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut command: Option<Command> = None;
    let mut pretty = false;
    let mut database_url: Option<String> = None;
    let mut gateway_url: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--pretty" => {
                pretty = true;
            }
            "--database-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--database-url requires a value\n{}", usage())
                })?;
                database_url = Some(value);
            }
            "--gateway-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--gateway-url requires a value\n{}", usage())
                })?;
                gateway_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other if command.is_none() => {
                command = Some(parse_command(other, &mut iter)?);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }

    let Some(command) = command else {
        bail!("Missing command\n{}", usage());
    };

    Ok(CliOptions {
        command,
        pretty,
        database_url,
        gateway_url,
    })
}

fn parse_command<I>(name: &str, rest: &mut I) -> Result<Command>
where
    I: Iterator<Item = String>,
{
    match name {
        "status" => Ok(Command::Status),
        "list" => Ok(Command::List),
        "flush" => Ok(Command::Flush),
        "clear-synced" => Ok(Command::ClearSynced),
        "retry" => {
            let id = rest
                .next()
                .ok_or_else(|| anyhow::anyhow!("retry requires an item id\n{}", usage()))?;
            Ok(Command::Retry(id))
        }
        "scan" => {
            let credential = rest
                .next()
                .ok_or_else(|| anyhow::anyhow!("scan requires a credential\n{}", usage()))?;
            Ok(Command::Scan(credential))
        }
        other => bail!("Unknown command: {other}\n{}", usage()),
    }
}
