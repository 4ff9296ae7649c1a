use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use canopy_runtime::{RuntimeConfig, TracingListener, WorkflowRuntime};

mod demo;
mod inspect;

use demo::{Mission, MissionProps};

/// Canopy - a hierarchical workflow runtime
#[derive(Parser)]
#[command(name = "canopy")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to a runtime config file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the mission demo, printing every rendering
  Run {
    /// Stage names, run in order
    #[arg(long, value_delimiter = ',', default_value = "ignition,liftoff,orbit")]
    stages: Vec<String>,

    /// Countdown length of each stage (snapshots store it as an i32)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=i32::MAX as i64))]
    count_from: u32,

    /// Milliseconds between countdown steps
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Abort the running stage after this many renderings
    #[arg(long)]
    abort_after: Option<usize>,

    /// Resume from a snapshot file
    #[arg(long)]
    snapshot_in: Option<PathBuf>,

    /// Write the last snapshot to this file on exit
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
  },

  /// Print the tree stored in a snapshot file as JSON
  Inspect {
    /// Path to the snapshot file
    snapshot: PathBuf,
  },
}

struct RunArgs {
  props: MissionProps,
  abort_after: Option<usize>,
  snapshot_in: Option<PathBuf>,
  snapshot_out: Option<PathBuf>,
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Run {
      stages,
      count_from,
      interval_ms,
      abort_after,
      snapshot_in,
      snapshot_out,
    }) => {
      let args = RunArgs {
        props: MissionProps {
          stages,
          count_from,
          interval: Duration::from_millis(interval_ms),
        },
        abort_after,
        snapshot_in,
        snapshot_out,
      };
      rt.block_on(run_mission(cli.config, args))?;
    }
    Some(Commands::Inspect { snapshot }) => {
      rt.block_on(inspect_snapshot(snapshot))?;
    }
    None => {
      println!("canopy - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init();
}

async fn load_config(path: Option<PathBuf>) -> Result<RuntimeConfig> {
  let Some(path) = path else {
    return Ok(RuntimeConfig::default());
  };
  let content = tokio::fs::read_to_string(&path)
    .await
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  RuntimeConfig::from_json(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

async fn run_mission(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
  let config = load_config(config_path).await?;
  let runtime = WorkflowRuntime::new(config, Mission).with_listener(Arc::new(TracingListener));

  let snapshot = match &args.snapshot_in {
    Some(path) => Some(inspect::read_snapshot(path).await?),
    None => None,
  };

  // Cancel on ctrl-c
  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let mut session = runtime
    .launch_with_props(args.props, snapshot, cancel)
    .await
    .context("failed to launch mission")?;
  eprintln!("Session: {}", session.session_id());

  let mut last_snapshot = None;
  let mut renderings = 0;
  while let Some(pass) = session.next_rendering().await {
    println!("{}", pass.rendering);
    renderings += 1;
    if args.abort_after == Some(renderings) && !pass.rendering.abort() {
      eprintln!("Nothing to abort");
    }
    last_snapshot = Some(pass.snapshot);
  }

  match session.outcome().await.context("mission failed")? {
    Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
    None => eprintln!("Mission cancelled"),
  }

  if let (Some(path), Some(snapshot)) = (&args.snapshot_out, &last_snapshot) {
    inspect::write_snapshot(path, snapshot).await?;
    eprintln!("Snapshot written to {}", path.display());
  }

  Ok(())
}

async fn inspect_snapshot(path: PathBuf) -> Result<()> {
  let snapshot = inspect::read_snapshot(&path).await?;
  let tree = inspect::describe(snapshot.bytes().clone())
    .with_context(|| format!("invalid snapshot file: {}", path.display()))?;
  println!("{}", serde_json::to_string_pretty(&tree)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn count_from(value: &str) -> Result<u32, clap::Error> {
    let cli = Cli::try_parse_from(["canopy", "run", "--count-from", value])?;
    match cli.command {
      Some(Commands::Run { count_from, .. }) => Ok(count_from),
      _ => panic!("expected the run command"),
    }
  }

  #[test]
  fn count_from_fits_in_a_snapshot() {
    assert_eq!(count_from("2147483647").unwrap(), i32::MAX as u32);
    assert!(count_from("2147483648").is_err());
    assert!(count_from("0").is_err());
  }

  #[test]
  fn stages_are_comma_separated() {
    let cli = Cli::try_parse_from(["canopy", "run", "--stages", "a,b"]).unwrap();
    match cli.command {
      Some(Commands::Run { stages, .. }) => assert_eq!(stages, vec!["a", "b"]),
      _ => panic!("expected the run command"),
    }
  }
}
