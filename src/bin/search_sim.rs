//! search-sim: 在内存上游上运行搜索优化层的命令行模拟器
//!
//! Usage:
//!   search-sim search <query>... [--max <n>] [--repeat <n>]   Free-text searches
//!   search-sim category <category> [term] [--max <n>]         Category search
//!   search-sim brand <brand> [term] [--max <n>]               Brand search
//!   search-sim config                                         Print the effective configuration

use anyhow::{bail, Context, Result};
use gift_search::upstream::InMemoryUpstream;
use gift_search::{Money, OptimizerConfig, SearchClient, SearchClientBuilder, SearchOptions};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_MAX: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("warn".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "search" => cmd_search(&args[2..]).await,
        "category" => cmd_category(&args[2..]).await,
        "brand" => cmd_brand(&args[2..]).await,
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("search-sim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"search-sim: 搜索成本优化层模拟器

USAGE:
    search-sim <COMMAND> [OPTIONS]

COMMANDS:
    search <query>...               Run free-text searches in order
    category <category> [term]      Search a category (unknown keys use the default strategy)
    brand <brand> [term]            Search a brand
    config                          Print the effective configuration as YAML
    version                         Show version information
    help                            Show this help message

OPTIONS:
    --config <path>                 YAML configuration (default: $GIFT_SEARCH_CONFIG)
    --max <n>                       Results per search (default: 10)
    --repeat <n>                    Issue each query n times concurrently
    --spent <dollars>               Budget already spent this month
    --fail                          Make the in-memory upstream fail every call

ENVIRONMENT:
    GIFT_SEARCH_CONFIG              Configuration file path
    RUST_LOG                        Log filter, e.g. gift_search=debug"#
    );
}

/// Split `args` into positional arguments and `--flag [value]` pairs.
fn split_args(args: &[String]) -> (Vec<String>, Vec<(String, Option<String>)>) {
    let mut positional = Vec::new();
    let mut flags = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            let value = match name {
                "fail" => None,
                _ => iter.next().cloned(),
            };
            flags.push((name.to_string(), value));
        } else {
            positional.push(arg.clone());
        }
    }
    (positional, flags)
}

fn flag<'a>(flags: &'a [(String, Option<String>)], name: &str) -> Option<&'a str> {
    flags
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, v)| v.as_deref())
}

fn has_flag(flags: &[(String, Option<String>)], name: &str) -> bool {
    flags.iter().any(|(n, _)| n == name)
}

fn parse_flag<T: std::str::FromStr>(
    flags: &[(String, Option<String>)],
    name: &str,
    default: T,
) -> Result<T> {
    match flag(flags, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid value for --{name}: {raw}")),
        None => Ok(default),
    }
}

fn load_config(flags: &[(String, Option<String>)]) -> Result<OptimizerConfig> {
    let config = match flag(flags, "config") {
        Some(path) => OptimizerConfig::from_file(path),
        None => OptimizerConfig::from_env(),
    };
    config.context("loading configuration")
}

async fn build_client(flags: &[(String, Option<String>)]) -> Result<SearchClient> {
    let upstream = Arc::new(InMemoryUpstream::new());
    if has_flag(flags, "fail") {
        upstream.fail_with("simulated upstream outage");
    }
    let client = SearchClientBuilder::new()
        .with_config(load_config(flags)?)
        .with_upstream(upstream)
        .without_background_tasks()
        .build()
        .await
        .context("building search client")?;
    let spent: f64 = parse_flag(flags, "spent", 0.0)?;
    if spent > 0.0 {
        client
            .orchestrator()
            .budget()
            .restore_spent(Money::from_dollars(spent));
    }
    Ok(client)
}

async fn finish(client: &SearchClient, output: serde_json::Value) -> Result<()> {
    let signals = client.signals().await;
    client.close().await?;
    let report = json!({ "output": output, "signals": signals });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_search(args: &[String]) -> Result<()> {
    let (queries, flags) = split_args(args);
    if queries.is_empty() {
        bail!("search needs at least one query");
    }
    let max: usize = parse_flag(&flags, "max", DEFAULT_MAX)?;
    let repeat: usize = parse_flag(&flags, "repeat", 1)?;
    let client = build_client(&flags).await?;

    let mut responses = Vec::new();
    for query in &queries {
        let batch = (0..repeat.max(1)).map(|_| client.search_detailed(query, max));
        responses.extend(futures::future::join_all(batch).await);
    }

    finish(&client, serde_json::to_value(&responses)?).await
}

async fn cmd_category(args: &[String]) -> Result<()> {
    let (positional, flags) = split_args(args);
    let Some(category) = positional.first() else {
        bail!("category needs a category key");
    };
    let term = positional.get(1).map(String::as_str).unwrap_or("");
    let options = SearchOptions::new().with_max_results(parse_flag(&flags, "max", DEFAULT_MAX)?);
    let client = build_client(&flags).await?;
    let result = client.execute_category(category, term, &options).await;
    finish(&client, serde_json::to_value(&result)?).await
}

async fn cmd_brand(args: &[String]) -> Result<()> {
    let (positional, flags) = split_args(args);
    let Some(brand) = positional.first() else {
        bail!("brand needs a brand name");
    };
    let term = positional.get(1).map(String::as_str).unwrap_or("");
    let options = SearchOptions::new().with_max_results(parse_flag(&flags, "max", DEFAULT_MAX)?);
    let client = build_client(&flags).await?;
    let result = client.registry().search_brand(brand, term, &options).await;
    finish(&client, serde_json::to_value(&result)?).await
}

fn cmd_config(args: &[String]) -> Result<()> {
    let (_, flags) = split_args(args);
    let config = load_config(&flags)?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
