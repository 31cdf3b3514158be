//! YAML scenarios: tables, their rows, and the views to print.
//!
//! ```yaml
//! config:
//!   poll_interval_ms: 50
//!   transport: serialized
//! tables:
//!   - name: sales
//!     schema: { region: string, units: integer }
//!     rows:
//!       - { region: east, units: 3 }
//!     csv: data/more_sales.csv      # relative to the scenario file
//!     views:
//!       - name: by_region
//!         row_pivot: [region]
//!         aggregate:
//!           - { op: sum, column: units }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pivotcast_core::prelude::{Row, Scalar, Schema, Transport, ViewConfig, WorkerConfig};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub poll_interval_ms: Option<u64>,
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<ScenarioConfig>,
    pub tables: Vec<TableDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub csv: Option<PathBuf>,
    /// Arrow IPC file or stream.
    #[serde(default)]
    pub arrow: Option<PathBuf>,
    #[serde(default)]
    pub views: Vec<ViewDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDef {
    pub name: String,
    #[serde(flatten)]
    pub config: ViewConfig,
}

/// A parsed scenario plus the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub scenario: Scenario,
    pub base_dir: PathBuf,
}

pub fn parse_scenario(yaml_src: &str) -> Result<Scenario, serde_yaml::Error> {
    serde_yaml::from_str(yaml_src)
}

pub fn load_scenario(path: &Path) -> CliResult<LoadedScenario> {
    let yaml = fs::read_to_string(path)?;
    let scenario = parse_scenario(&yaml)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(LoadedScenario { scenario, base_dir })
}

pub fn apply_scenario_config(cfg: &mut WorkerConfig, doc: &ScenarioConfig) {
    if let Some(ms) = doc.poll_interval_ms {
        cfg.poll_interval_ms = ms.max(1);
    }
    if let Some(transport) = doc.transport {
        cfg.transport = transport;
    }
}

impl TableDef {
    /// Inline rows typed by the declared schema. Unknown fields are dropped.
    pub fn inline_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|obj| {
                self.schema
                    .iter()
                    .filter_map(|(name, ty)| {
                        obj.get(name)
                            .map(|v| (name.to_string(), Scalar::from_json(v, ty)))
                    })
                    .collect()
            })
            .collect()
    }

    /// Rows of the table's CSV file. The header row names the columns; empty
    /// fields are null.
    pub fn csv_rows(&self, base_dir: &Path) -> CliResult<Vec<Row>> {
        let Some(rel) = &self.csv else {
            return Ok(Vec::new());
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(base_dir.join(rel))?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = Row::new();
            for (name, field) in headers.iter().zip(record.iter()) {
                let Some(ty) = self.schema.get(name) else {
                    continue;
                };
                let value = if field.is_empty() {
                    Scalar::Null
                } else {
                    Scalar::Str(field.to_string()).coerce(ty)
                };
                row.insert(name.to_string(), value);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn arrow_bytes(&self, base_dir: &Path) -> CliResult<Option<Vec<u8>>> {
        match &self.arrow {
            Some(rel) => Ok(Some(fs::read(base_dir.join(rel))?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivotcast_core::schema::LogicalType;
    use std::io::Write;

    const YAML: &str = r#"
config:
  poll_interval_ms: 20
  transport: serialized
tables:
  - name: t
    schema: { x: integer, y: string, d: date }
    rows:
      - { x: 1, y: a, d: "2024-01-02" }
      - { x: "2", y: b, extra: 9 }
    views:
      - name: flat
      - name: by_y
        row_pivot: [y]
        aggregate:
          - { op: sum, column: x }
"#;

    #[test]
    fn parses_tables_and_views() {
        let scenario = parse_scenario(YAML).unwrap();
        let table = &scenario.tables[0];
        assert_eq!(
            table.schema.names().collect::<Vec<_>>(),
            vec!["x", "y", "d"]
        );
        assert_eq!(table.schema.get("d"), Some(LogicalType::Date));
        assert_eq!(table.views.len(), 2);
        assert_eq!(table.views[1].config.row_pivots(), &["y".to_string()]);
        assert!(table.views[0].config.aggregate.is_none());
    }

    #[test]
    fn inline_rows_follow_the_schema() {
        let scenario = parse_scenario(YAML).unwrap();
        let rows = scenario.tables[0].inline_rows();
        assert_eq!(rows[0]["x"], Scalar::Int(1));
        assert!(matches!(rows[0]["d"], Scalar::Date(_)));
        assert_eq!(rows[1]["x"], Scalar::Int(2));
        assert!(!rows[1].contains_key("extra"));
        assert!(!rows[1].contains_key("d"));
    }

    #[test]
    fn scenario_config_overrides_env_defaults() {
        let scenario = parse_scenario(YAML).unwrap();
        let mut cfg = WorkerConfig::default();
        apply_scenario_config(&mut cfg, scenario.config.as_ref().unwrap());
        assert_eq!(cfg.poll_interval_ms, 20);
        assert_eq!(cfg.transport, Transport::Serialized);
    }

    #[test]
    fn csv_fields_are_typed_and_blank_is_null() {
        let dir = std::env::temp_dir().join(format!("pivotcast-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut f = fs::File::create(dir.join("t.csv")).unwrap();
        writeln!(f, "x,y,ignored").unwrap();
        writeln!(f, "4,c,z").unwrap();
        writeln!(f, ",d,z").unwrap();
        drop(f);

        let table = TableDef {
            name: "t".into(),
            schema: Schema::new()
                .with("x", LogicalType::Integer)
                .with("y", LogicalType::String),
            index: None,
            rows: Vec::new(),
            csv: Some("t.csv".into()),
            arrow: None,
            views: Vec::new(),
        };
        let rows = table.csv_rows(&dir).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["x"], Scalar::Int(4));
        assert_eq!(rows[1]["x"], Scalar::Null);
        assert!(!rows[0].contains_key("ignored"));
        fs::remove_dir_all(&dir).ok();
    }
}
