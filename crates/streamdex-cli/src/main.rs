//! 🚀 streamdex-cli: replay a captured change batch through the handler, once.
//!
//! 🎬 *[narrator voice]* "It all started with a JSON file someone copied out of a log..."
//! 📦 Thin wrapper: parse args, set up logging, load config, read the event, run, report. 🦆

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🌊 Turn a change-stream batch into one bulk request.
#[derive(Debug, Parser)]
#[command(name = "streamdex-cli", version, about)]
struct Args {
    /// 📬 JSON file holding one batch event (`{"Records": [...]}`).
    #[arg(long)]
    event: PathBuf,

    /// 🔧 TOML config file. Without one, only `SDX_*` env vars are used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// 🧪 Build the bulk request but keep it in memory.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(err) = replay(&args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the cluster isn't reachable. \
                Double-check the backend url and that Elasticsearch is actually running. \
                If you're using Docker, `docker ps` will tell you what's up. \
                Or rerun with --dry-run to see what would have been sent. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}

async fn replay(args: &Args) -> Result<()> {
    if let Some(config) = &args.config {
        let exists = config.try_exists().with_context(|| {
            format!("💀 Couldn't check whether the config file exists: '{}'", config.display())
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Config file '{}' does not exist. Maybe it's a pwd/cwd thing; try an absolute path.",
                config.display()
            );
        }
    }

    let app_config = streamdex::app_config::load_config(args.config.as_deref())
        .context("💀 In streamdex-cli we couldn't load the config. Take a look at the file and the SDX_* env vars.")?;

    let raw = tokio::fs::read_to_string(&args.event)
        .await
        .with_context(|| format!("💀 Couldn't read the event file '{}'", args.event.display()))?;
    let event: Value = serde_json::from_str(&raw)
        .with_context(|| format!("💀 '{}' is not JSON. A batch event has to be.", args.event.display()))?;

    let result = streamdex::run(app_config, event, args.dry_run).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("💀 The result refused to be pretty-printed")?
    );
    println!("{}", summary_table(&result));
    Ok(())
}

/// 🍽️ Per-verb tally of the bulk reply's items: how many landed, how many didn't.
fn summary_table(result: &Value) -> Table {
    let mut tally: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let items = result.get("items").and_then(Value::as_array);
    for item in items.into_iter().flatten() {
        let Some(outcomes) = item.as_object() else { continue };
        for (verb, outcome) in outcomes {
            let failed = outcome.get("error").is_some()
                || outcome
                    .get("status")
                    .and_then(Value::as_u64)
                    .is_some_and(|status| status >= 300);
            let entry = tally.entry(verb.clone()).or_default();
            if failed {
                entry.1 += 1;
            } else {
                entry.0 += 1;
            }
        }
    }

    let mut table = Table::new();
    table.set_header(vec!["action", "ok", "failed"]);
    for (verb, (ok, failed)) in &tally {
        table.add_row(vec![verb.clone(), ok.to_string(), failed.to_string()]);
    }
    if tally.is_empty() {
        table.add_row(vec!["(none)".to_string(), "0".to_string(), "0".to_string()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_the_table_counts_wins_and_losses() {
        let reply = json!({"items": [
            {"index": {"_id": "a", "status": 201}},
            {"index": {"_id": "b", "status": 409, "error": {"type": "version_conflict_engine_exception"}}},
            {"delete": {"_id": "c", "status": 200}}
        ]});
        let rendered = summary_table(&reply).to_string();
        let index_row = rendered.lines().find(|line| line.contains("index")).unwrap_or_default();
        assert!(index_row.contains('1'));
        assert!(rendered.lines().any(|line| line.contains("delete")));
    }

    #[test]
    fn the_one_where_args_parse_like_they_should() {
        let args = Args::parse_from(["streamdex-cli", "--event", "batch.json", "--dry-run"]);
        assert_eq!(args.event, PathBuf::from("batch.json"));
        assert!(args.dry_run);
        assert!(args.config.is_none());
    }
}
