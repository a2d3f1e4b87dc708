//! Observers CLI
//!
//! The `observers` command drives the observation store from a shell.
//!
//! ## Commands
//!
//! - `create`: Record an observation
//! - `list`: List observations with filters
//! - `get` / `ack` / `resolve`: Inspect and move one observation through its lifecycle
//! - `clear-resolved`: Drop every resolved observation
//! - `exec`: Run a raw JSON argument bag through the dispatch tool
//! - `display`: Render the current observations as text
//! - `schema`: Print the tool name, description, and input schema

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{debug, Level};

use observers_core::{
    display, obs, DisplayConfig, DisplayStyle, HookRegistry, ListQuery, ObservationDisplayHook,
    ObservationsTool, StoreConfig, ToolResult, METRICS,
};
use observers_state::{FsStateStore, StateStore};

#[derive(Parser)]
#[command(name = "observers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track and triage findings from automated reviewers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the state documents
    #[arg(long, global = true, env = "OBSERVERS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Key of the state document inside the state directory
    #[arg(long, global = true, env = "OBSERVERS_STATE_KEY")]
    state_key: Option<String>,

    /// After a change, print a summary in this style (compact, table, progress_bar)
    #[arg(long, global = true)]
    show: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new observation
    Create {
        /// Observation text
        content: String,

        /// Name of the reviewer reporting it
        #[arg(short, long)]
        observer: Option<String>,

        /// critical, high, medium, low, or info
        #[arg(short, long)]
        severity: Option<String>,

        /// code, conversation, or unknown
        #[arg(long)]
        source_type: Option<String>,

        /// Where the problem lives (file:line, message id, ...)
        #[arg(long)]
        source_ref: Option<String>,

        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// List observations
    List {
        /// Only these statuses (repeatable)
        #[arg(long)]
        status: Vec<String>,

        /// Only these severities (repeatable)
        #[arg(long)]
        severity: Vec<String>,

        /// Only this observer
        #[arg(long)]
        observer: Option<String>,

        /// severity or created_at
        #[arg(long)]
        sort_by: Option<String>,

        /// Maximum number of observations to return
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },

    /// Show one observation
    Get {
        /// Observation ID
        id: String,
    },

    /// Mark an observation as acknowledged
    Ack {
        /// Observation ID
        id: String,
    },

    /// Mark an observation as resolved
    Resolve {
        /// Observation ID
        id: String,

        /// Resolution note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Remove every resolved observation
    ClearResolved,

    /// Run a raw JSON argument bag (read from stdin when --args is omitted)
    Exec {
        /// Argument bag, e.g. '{"operation": "list"}'
        #[arg(long)]
        args: Option<String>,
    },

    /// Render the current observations as text
    Display {
        /// compact, table, or progress_bar
        #[arg(long, default_value = "compact")]
        style: String,
    },

    /// Print the tool name, description, and input schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    observers_core::init_tracing(cli.json, level);

    if let Commands::Schema = cli.command {
        return print_json(&schema());
    }

    let config = store_config(cli.state_dir.as_deref(), cli.state_key.as_deref());
    let _span = obs::StoreSpan::enter(&config.state_key);
    let mut tool = mount_tool(&config, cli.show.as_deref()).await?;

    let succeeded = match cli.command {
        Commands::Display { style } => {
            cmd_display(&tool, DisplayStyle::from(style))?;
            true
        }
        Commands::Exec { args } => {
            let raw = match args {
                Some(raw) => raw,
                None => read_stdin()?,
            };
            let arguments: Value =
                serde_json::from_str(&raw).context("Argument bag is not valid JSON")?;
            run(&mut tool, &arguments).await?
        }
        command => {
            let arguments = build_arguments(&command)?;
            run(&mut tool, &arguments).await?
        }
    };

    METRICS.flush();

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn store_config(state_dir: Option<&Path>, state_key: Option<&str>) -> StoreConfig {
    let mut config = StoreConfig::from_env();
    if let Some(dir) = state_dir {
        config = config.with_state_dir(dir);
    }
    if let Some(key) = state_key {
        config = config.with_state_key(key);
    }
    config
}

async fn mount_tool(config: &StoreConfig, show: Option<&str>) -> Result<ObservationsTool> {
    let backend: Arc<dyn StateStore> = Arc::new(
        FsStateStore::new(&config.state_dir).with_context(|| {
            format!(
                "Failed to open state directory {}",
                config.state_dir.display()
            )
        })?,
    );

    let tool = ObservationsTool::mount(Some(backend), config.state_key.as_str())
        .await
        .with_context(|| format!("Failed to load state '{}'", config.state_key))?;
    debug!(
        state_dir = %config.state_dir.display(),
        state_key = %config.state_key,
        count = tool.store().len(),
        "store mounted"
    );

    let Some(style) = show else {
        return Ok(tool);
    };
    let mut registry = HookRegistry::new();
    ObservationDisplayHook::new(DisplayConfig::default().with_style(style.to_string().into()))
        .register(&mut registry);
    Ok(tool.with_hooks(Arc::new(registry)))
}

/// Execute `arguments`, print the result, and report whether it succeeded.
async fn run(tool: &mut ObservationsTool, arguments: &Value) -> Result<bool> {
    let result = tool.execute(arguments).await;
    print_result(&result)?;
    for content in tool.take_displays() {
        eprintln!("{content}");
    }
    Ok(result.success)
}

fn cmd_display(tool: &ObservationsTool, style: DisplayStyle) -> Result<()> {
    let result = tool
        .store()
        .list(&ListQuery::all().with_limit(tool.store().len().max(1)))?;
    println!("{}", display::render(style, &result.observations));
    Ok(())
}

/// Translate a subcommand into the dispatch tool's argument bag.
fn build_arguments(command: &Commands) -> Result<Value> {
    let mut args = Map::new();
    let operation = match command {
        Commands::Create {
            content,
            observer,
            severity,
            source_type,
            source_ref,
            metadata,
        } => {
            args.insert("content".into(), json!(content));
            insert_opt(&mut args, "observer", observer);
            insert_opt(&mut args, "severity", severity);
            insert_opt(&mut args, "source_type", source_type);
            insert_opt(&mut args, "source_ref", source_ref);
            if let Some(raw) = metadata {
                let value: Value =
                    serde_json::from_str(raw).context("--metadata is not valid JSON")?;
                args.insert("metadata".into(), value);
            }
            "create"
        }
        Commands::List {
            status,
            severity,
            observer,
            sort_by,
            limit,
        } => {
            let mut filters = Map::new();
            if !status.is_empty() {
                filters.insert("status".into(), json!(status));
            }
            if !severity.is_empty() {
                filters.insert("severity".into(), json!(severity));
            }
            insert_opt(&mut filters, "observer", observer);
            if !filters.is_empty() {
                args.insert("filters".into(), Value::Object(filters));
            }
            insert_opt(&mut args, "sort_by", sort_by);
            if let Some(limit) = limit {
                args.insert("limit".into(), json!(limit));
            }
            "list"
        }
        Commands::Get { id } => {
            args.insert("observation_id".into(), json!(id));
            "get"
        }
        Commands::Ack { id } => {
            args.insert("observation_id".into(), json!(id));
            "acknowledge"
        }
        Commands::Resolve { id, note } => {
            args.insert("observation_id".into(), json!(id));
            insert_opt(&mut args, "resolution_note", note);
            "resolve"
        }
        Commands::ClearResolved => "clear_resolved",
        Commands::Exec { .. } | Commands::Display { .. } | Commands::Schema => {
            bail!("command does not map to a single operation")
        }
    };
    args.insert("operation".into(), json!(operation));
    Ok(Value::Object(args))
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

fn schema() -> Value {
    json!({
        "name": ObservationsTool::NAME,
        "description": ObservationsTool::DESCRIPTION,
        "input_schema": ObservationsTool::input_schema(),
    })
}

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read argument bag from stdin")?;
    Ok(raw)
}

fn print_result(result: &ToolResult) -> Result<()> {
    print_json(&serde_json::to_value(result).context("Failed to encode result")?)
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("observers").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_builds_argument_bag() {
        let cli = parse(&[
            "create",
            "panic on empty input",
            "--observer",
            "fuzz",
            "-s",
            "high",
            "--metadata",
            r#"{"seed": 7}"#,
        ]);
        let args = build_arguments(&cli.command).unwrap();
        assert_eq!(
            args,
            json!({
                "operation": "create",
                "content": "panic on empty input",
                "observer": "fuzz",
                "severity": "high",
                "metadata": {"seed": 7}
            })
        );
    }

    #[test]
    fn test_list_builds_filters() {
        let cli = parse(&[
            "list",
            "--severity",
            "critical",
            "--severity",
            "high",
            "--sort-by",
            "created_at",
            "--limit",
            "5",
        ]);
        let args = build_arguments(&cli.command).unwrap();
        assert_eq!(args["operation"], "list");
        assert_eq!(args["filters"], json!({"severity": ["critical", "high"]}));
        assert_eq!(args["sort_by"], "created_at");
        assert_eq!(args["limit"], 5);
    }

    #[test]
    fn test_list_passes_negative_limit_through() {
        let cli = parse(&["list", "--limit", "-1"]);
        let args = build_arguments(&cli.command).unwrap();
        assert_eq!(args["limit"], -1);
    }

    #[test]
    fn test_ack_and_resolve_map_to_operations() {
        let cli = parse(&["ack", "abc"]);
        assert_eq!(
            build_arguments(&cli.command).unwrap(),
            json!({"operation": "acknowledge", "observation_id": "abc"})
        );

        let cli = parse(&["resolve", "abc", "--note", "done"]);
        assert_eq!(
            build_arguments(&cli.command).unwrap(),
            json!({"operation": "resolve", "observation_id": "abc", "resolution_note": "done"})
        );
    }

    #[test]
    fn test_bad_metadata_is_an_error() {
        let cli = parse(&["create", "x", "--metadata", "{not json"]);
        assert!(build_arguments(&cli.command).is_err());
    }

    #[test]
    fn test_schema_carries_tool_metadata() {
        let schema = schema();
        assert_eq!(schema["name"], "observations");
        assert!(schema["description"].as_str().unwrap().contains("clear_resolved"));
        assert_eq!(schema["input_schema"]["type"], "object");
    }

    #[test]
    fn test_flags_override_config() {
        let config = store_config(Some(Path::new("/tmp/review")), Some("pr-42"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/review"));
        assert_eq!(config.state_key, "pr-42");
    }

    #[tokio::test]
    async fn test_commands_persist_across_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default()
            .with_state_dir(dir.path())
            .with_state_key("cli");

        let mut tool = mount_tool(&config, None).await.unwrap();
        let created = parse(&["create", "stale cache entry", "-s", "medium"]);
        assert!(run(&mut tool, &build_arguments(&created.command).unwrap())
            .await
            .unwrap());

        let tool = mount_tool(&config, None).await.unwrap();
        assert_eq!(tool.store().len(), 1);
    }

    #[tokio::test]
    async fn test_show_registers_display_hook() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default().with_state_dir(dir.path());

        let mut tool = mount_tool(&config, Some("compact")).await.unwrap();
        tool.execute(&json!({"operation": "create", "content": "x", "severity": "low"}))
            .await;
        assert_eq!(
            tool.take_displays(),
            vec!["Observations: 1 open, 0 ack, 0 done".to_string()]
        );
    }
}
