use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use herald_core::app::{Dispatcher, DispatcherBuilder, JobIntake, ScheduleRequest, TickLoop};
use herald_core::config::HeraldConfig;
use herald_core::domain::{Bucket, JobId, JobUpdate, TargetType, floor_to_minute_utc};
use herald_core::impls::{CommandInvoker, JsonFileJobStore};
use herald_core::ports::{
    Clock, ContinuationToken, JobStore, ListFilter, SystemClock, UlidGenerator,
};

#[derive(Debug, Parser)]
#[command(name = "herald", version, about = "Minute-bucketed job dispatcher")]
struct Cli {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(long, env = "HERALD_CONFIG", default_value = "herald.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dispatch every minute until Ctrl-C.
    Run,
    /// Run a single dispatch cycle and print its report.
    Dispatch {
        /// Bucket to dispatch (YYYYMMDDHHmm). Defaults to the current minute.
        #[arg(long)]
        bucket: Option<Bucket>,
    },
    /// Schedule a target to run at one or more instants.
    Schedule {
        #[arg(long)]
        target_type: String,
        #[arg(long)]
        target_id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// JSON object handed to the target.
        #[arg(long, default_value = "{}")]
        context: String,
        /// RFC 3339 timestamp or epoch milliseconds. Repeatable.
        #[arg(long = "at", required = true, value_parser = parse_instant)]
        at: Vec<i64>,
    },
    /// Print one job.
    Get { id: String },
    /// Print stored jobs.
    List {
        #[arg(long)]
        target_type: Option<String>,
    },
    /// Edit the description or context of a pending job.
    Update {
        id: String,
        #[arg(long)]
        description: Option<String>,
        /// Replacement JSON object handed to the target.
        #[arg(long)]
        context: Option<String>,
    },
    /// Delete one job.
    Delete { id: String },
    /// Print the bucket containing now, or the given instant.
    Bucket {
        #[arg(long, value_parser = parse_instant)]
        at: Option<i64>,
    },
}

fn parse_instant(raw: &str) -> Result<i64, String> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| format!("expected RFC 3339 or epoch milliseconds: {e}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries command output
    if env::var("RUST_LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(config: &HeraldConfig) -> Arc<JsonFileJobStore> {
    Arc::new(
        JsonFileJobStore::new(&config.store.path).with_page_size(config.dispatcher.query_page_size),
    )
}

fn build_dispatcher(config: &HeraldConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Dispatcher> {
    let mut builder = DispatcherBuilder::new()
        .store(open_store(config))
        .invoker(Arc::new(CommandInvoker::new(config.invoke_timeout())))
        .registry(config.registry())
        .clock(clock);
    if let Some(limit) = config.dispatcher.max_concurrent_invocations {
        builder = builder.max_concurrent_invocations(limit);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = HeraldConfig::read_from_file(Some(cli.config.as_path()))
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Run => {
            let dispatcher = Arc::new(build_dispatcher(&config, clock)?);
            info!(
                targets = dispatcher.registry().len(),
                store = %config.store.path.display(),
                "herald started"
            );
            let ticks = TickLoop::spawn(dispatcher, config.tick_config());
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            ticks.shutdown_and_join().await;
        }
        Command::Dispatch { bucket } => {
            let dispatcher = build_dispatcher(&config, clock.clone())?;
            let bucket = bucket.unwrap_or_else(|| floor_to_minute_utc(clock.now()));
            let report = dispatcher.run_cycle_for(bucket).await;
            print_json(&report)?;
        }
        Command::Schedule {
            target_type,
            target_id,
            description,
            context,
            at,
        } => {
            let context: Value =
                serde_json::from_str(&context).context("--context must be valid JSON")?;
            let intake = JobIntake::new(
                open_store(&config),
                Arc::new(UlidGenerator::new(clock.clone())),
                clock,
                config.intake_policy(),
            );
            let jobs = intake
                .schedule(ScheduleRequest {
                    target_type,
                    target_id,
                    description,
                    context,
                    schedules: at,
                })
                .await?;
            print_json(&jobs)?;
        }
        Command::Get { id } => {
            let job = open_store(&config)
                .get(&JobId::from_raw(id.as_str()))
                .await?
                .with_context(|| format!("job {id} not found"))?;
            print_json(&job)?;
        }
        Command::List { target_type } => {
            let store = open_store(&config);
            let filter = ListFilter {
                target_type: target_type.map(TargetType::new),
            };
            let mut jobs = Vec::new();
            let mut continuation: Option<ContinuationToken> = None;
            loop {
                let page = store.list(&filter, continuation).await?;
                jobs.extend(page.items);
                match page.next {
                    Some(next) => continuation = Some(next),
                    None => break,
                }
            }
            print_json(&jobs)?;
        }
        Command::Update {
            id,
            description,
            context,
        } => {
            let store = open_store(&config);
            let id = JobId::from_raw(id);
            let current = store
                .get(&id)
                .await?
                .with_context(|| format!("job {id} not found"))?;
            let context = match context {
                Some(raw) => serde_json::from_str(&raw).context("--context must be valid JSON")?,
                None => current.context,
            };
            anyhow::ensure!(context.is_object(), "context must be a JSON object");
            let update = JobUpdate::Content {
                description: description.or(current.description),
                context,
            };
            store.update(&id, update).await?;
            print_json(&store.get(&id).await?)?;
        }
        Command::Delete { id } => {
            open_store(&config).delete(&JobId::from_raw(id)).await?;
        }
        Command::Bucket { at } => {
            let bucket = match at {
                Some(ms) => Bucket::from_millis(ms).context("timestamp out of range")?,
                None => floor_to_minute_utc(clock.now()),
            };
            println!("{bucket}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn instants_accept_rfc3339_and_millis() {
        assert_eq!(parse_instant("1704101400000"), Ok(1_704_101_400_000));
        assert_eq!(parse_instant("2024-01-01T09:30:00Z"), Ok(1_704_101_400_000));
        assert_eq!(parse_instant("2024-01-01T10:30:00+01:00"), Ok(1_704_101_400_000));
        assert!(parse_instant("tomorrow").is_err());
    }

    #[test]
    fn dispatch_takes_an_explicit_bucket() {
        let cli = Cli::try_parse_from(["herald", "dispatch", "--bucket", "202401010930"]).unwrap();
        match cli.command {
            Command::Dispatch { bucket } => {
                assert_eq!(bucket.map(|b| b.to_string()).as_deref(), Some("202401010930"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn schedule_collects_repeated_instants() {
        let cli = Cli::try_parse_from([
            "herald",
            "schedule",
            "--target-type",
            "orders",
            "--at",
            "1704101400000",
            "--at",
            "2024-01-01T10:30:00Z",
        ])
        .unwrap();
        match cli.command {
            Command::Schedule { at, context, .. } => {
                assert_eq!(at, vec![1_704_101_400_000, 1_704_105_000_000]);
                assert_eq!(context, "{}");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
