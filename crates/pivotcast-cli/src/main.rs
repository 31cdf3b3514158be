//! pivotcast CLI: run view scenarios through a live worker.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pivotcast_client::Engine;
use pivotcast_core::config::{Transport, WorkerConfig};
use pivotcast_core::mapper::to_storage_type;
use pivotcast_engine::{EngineCore, MemoryEngine, TableSpec};
use pivotcast_view::build_context;

mod output;
mod scenario;

use output::{format_snapshot, OutputFormat};
use scenario::{apply_scenario_config, load_scenario, CliResult, LoadedScenario};

#[derive(Parser)]
#[command(name = "pivotcast")]
#[command(about = "Pivot views over live tables, computed in a background worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a scenario's tables and print every view's snapshot
    Run {
        /// Path to the scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Poll interval in milliseconds (overrides config)
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Command transport: shared or serialized (overrides config)
        #[arg(long)]
        transport: Option<String>,
    },

    /// Parse a scenario and build every view against a scratch engine
    Validate {
        /// Path to the scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PIVOTCAST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            format,
            poll_interval_ms,
            transport,
        } => {
            if let Err(e) = run_scenario(&scenario, format, poll_interval_ms, transport).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { scenario } => {
            if let Err(e) = validate_scenario(&scenario) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Scenario is valid");
        }
    }
}

fn worker_config(
    loaded: &LoadedScenario,
    poll_interval_ms: Option<u64>,
    transport: Option<String>,
) -> CliResult<WorkerConfig> {
    let mut config = WorkerConfig::from_env();
    if let Some(doc) = &loaded.scenario.config {
        apply_scenario_config(&mut config, doc);
    }
    if let Some(ms) = poll_interval_ms {
        config.poll_interval_ms = ms.max(1);
    }
    if let Some(t) = transport {
        config.transport =
            Transport::parse(&t).ok_or_else(|| format!("unknown transport '{t}'"))?;
    }
    Ok(config)
}

async fn run_scenario(
    path: &Path,
    format: OutputFormat,
    poll_interval_ms: Option<u64>,
    transport: Option<String>,
) -> CliResult<()> {
    let loaded = load_scenario(path)?;
    let config = worker_config(&loaded, poll_interval_ms, transport)?;
    info!(poll_ms = config.poll_interval_ms, transport = ?config.transport, "starting worker");
    let engine = Engine::new(config)?;

    let mut views = Vec::new();
    for def in &loaded.scenario.tables {
        let table = engine.table_named(&def.name, def.schema.clone(), def.index.as_deref());
        let mut rows = def.inline_rows();
        rows.extend(def.csv_rows(&loaded.base_dir)?);
        info!(table = %def.name, rows = rows.len(), "loading rows");
        if !rows.is_empty() {
            table.update(rows);
        }
        if let Some(bytes) = def.arrow_bytes(&loaded.base_dir)? {
            table.update_buffer(bytes);
        }
        for view in &def.views {
            views.push(table.view_named(&view.name, view.config.clone())?);
        }
    }

    for view in &views {
        let flat = view.to_flat().await?;
        println!("{}", format_snapshot(view.name(), &flat, format));
    }

    engine.shutdown().await;
    engine.join();
    Ok(())
}

/// Every view's configuration is lowered and registered against an empty
/// `MemoryEngine` holding the declared tables.
fn validate_scenario(path: &Path) -> CliResult<()> {
    let loaded = load_scenario(path)?;
    let mut engine = MemoryEngine::new();
    for def in &loaded.scenario.tables {
        let gnode = engine.register_gnode(TableSpec {
            names: def.schema.names().map(str::to_string).collect(),
            types: def.schema.types().map(|t| to_storage_type(t.as_str())).collect(),
            index: def.index.clone(),
        })?;
        for view in &def.views {
            build_context(&mut engine, gnode, &view.name, &view.config)
                .map_err(|e| format!("view '{}' on table '{}': {e}", view.name, def.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_scenario(name: &str, yaml: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pivotcast-main-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scenario.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn flags_override_scenario_config() {
        let path = write_scenario(
            "flags",
            "config: { poll_interval_ms: 20, transport: serialized }\ntables: []\n",
        );
        let loaded = load_scenario(&path).unwrap();
        let cfg = worker_config(&loaded, None, None).unwrap();
        assert_eq!(cfg.poll_interval_ms, 20);
        let cfg = worker_config(&loaded, Some(7), Some("shared".into())).unwrap();
        assert_eq!(cfg.poll_interval_ms, 7);
        assert_eq!(cfg.transport, Transport::Shared);
        assert!(worker_config(&loaded, None, Some("carrier".into())).is_err());
    }

    #[test]
    fn validate_reports_bad_aggregates() {
        let path = write_scenario(
            "bad",
            r#"
tables:
  - name: t
    schema: { a: float, b: float }
    views:
      - name: wm
        aggregate:
          - { op: weighted mean, column: a }
"#,
        );
        let err = validate_scenario(&path).unwrap_err().to_string();
        assert!(err.contains("wm"));
        assert!(err.contains("arity"));
    }

    #[test]
    fn validate_accepts_good_scenarios() {
        let path = write_scenario(
            "good",
            r#"
tables:
  - name: t
    schema: { a: float, b: float, g: string }
    views:
      - name: wm
        row_pivot: [g]
        aggregate:
          - { op: weighted mean, column: [a, b] }
"#,
        );
        validate_scenario(&path).unwrap();
    }
}
