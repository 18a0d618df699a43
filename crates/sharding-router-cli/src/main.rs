//! sharding-router CLI - validate sharding rules, preview routes and draw keys.

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sharding_router::core::ColumnCondition;
use sharding_router::{
    ConditionExtractor, ConditionValue, HintManager, RouteEngine, RuleConfig, ShardingCondition,
    ShardingError, ShardingRange, ShardingRule, ShardingValue, StatementContext,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "sharding-router")]
#[command(about = "Sharding rule validation, route preview and key generation")]
#[command(version)]
struct Cli {
    /// Path to YAML rule file
    #[arg(short, long, default_value = "rules.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the rule file and build the rule model
    Validate,

    /// Print the actual data nodes of every sharded table
    Nodes {
        /// Only this logic table
        #[arg(long)]
        table: Option<String>,
    },

    /// Preview the route of a statement
    Route(RouteArgs),

    /// Generate distributed keys
    Keygen {
        /// Logic table whose key generate strategy to use
        #[arg(long, conflicts_with = "generator")]
        table: Option<String>,

        /// Key generator name from the rule file
        #[arg(long)]
        generator: Option<String>,

        /// Number of keys to generate
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
}

/// A statement described on the command line.
#[derive(Args)]
struct RouteArgs {
    /// Logic tables of the statement, in statement order
    #[arg(long = "table", required = true)]
    tables: Vec<String>,

    /// Precise condition: table.column=value
    #[arg(long)]
    eq: Vec<String>,

    /// IN condition: table.column=v1,v2,...
    #[arg(long = "in")]
    in_list: Vec<String>,

    /// Range condition: table.column=lower..upper (either side may be empty)
    #[arg(long)]
    range: Vec<String>,

    /// Hint database value for a table: table=value
    #[arg(long)]
    hint_db: Vec<String>,

    /// Hint table value for a table: table=value
    #[arg(long)]
    hint_table: Vec<String>,

    /// Hint database value for every table
    #[arg(long, conflicts_with_all = ["hint_db", "hint_table"])]
    hint_db_only: Option<String>,

    /// Send the whole statement to this data source
    #[arg(long)]
    hint_data_source: Option<String>,

    /// Mark the route write-only
    #[arg(long)]
    write_only: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), ShardingError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = RuleConfig::load(&cli.config)?;
    info!("Loaded rule file from {:?}", cli.config);
    let rule = ShardingRule::from_config(&config)?;

    match cli.command {
        Commands::Validate => {
            if cli.output_json {
                let summary = json!({
                    "valid": true,
                    "data_sources": rule.data_sources(),
                    "tables": rule.table_rules().count(),
                    "broadcast_tables": rule.broadcast_tables().collect::<Vec<_>>(),
                    "fingerprint": rule.fingerprint(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Rule file is valid");
                println!("  Data sources: {}", rule.data_sources().join(", "));
                println!("  Sharded tables: {}", rule.table_rules().count());
                println!("  Fingerprint: {}", rule.fingerprint());
            }
        }

        Commands::Nodes { table } => {
            let rules: Vec<_> = match &table {
                Some(name) => vec![rule.table_rule(name).ok_or_else(|| {
                    ShardingError::Config(format!("Table {} has no sharding rule", name))
                })?],
                None => rule.table_rules().collect(),
            };

            if cli.output_json {
                let tables: Vec<_> = rules
                    .iter()
                    .map(|r| {
                        json!({
                            "logic_table": r.logic_table(),
                            "auto": r.is_auto(),
                            "database_strategy": r.database_strategy().to_string(),
                            "table_strategy": r.table_strategy().to_string(),
                            "actual_data_nodes": r.actual_data_nodes(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for r in rules {
                    println!(
                        "{} [database: {}, table: {}]",
                        r.logic_table(),
                        r.database_strategy(),
                        r.table_strategy()
                    );
                    for node in r.actual_data_nodes() {
                        println!("  {}", node);
                    }
                }
            }
        }

        Commands::Route(args) => {
            let engine = RouteEngine::new(Arc::new(rule));
            let result = {
                let mut hint = HintManager::acquire()?;
                if let Some(value) = &args.hint_db_only {
                    hint.set_database_sharding_value(ShardingValue::from_literal(value));
                }
                for pair in &args.hint_db {
                    let (table, value) = split_pair(pair)?;
                    hint.add_database_sharding_value(table, ShardingValue::from_literal(value));
                }
                for pair in &args.hint_table {
                    let (table, value) = split_pair(pair)?;
                    hint.add_table_sharding_value(table, ShardingValue::from_literal(value));
                }
                if let Some(ds) = &args.hint_data_source {
                    hint.set_data_source_name(ds.clone());
                }
                if args.write_only {
                    hint.set_write_route_only();
                }
                engine.route_statement(&args, &ArgsExtractor)?
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for route in &result.table_routes {
                    let nodes: Vec<String> = route.nodes.iter().map(ToString::to_string).collect();
                    println!("{} ({}): {}", route.logic_table, route.source, nodes.join(", "));
                }
                if result.write_route_only {
                    println!("(write route only)");
                }
            }
        }

        Commands::Keygen {
            table,
            generator,
            count,
        } => {
            let mut keys = Vec::with_capacity(count);
            match (table, generator) {
                (Some(table), _) => {
                    for _ in 0..count {
                        let key = rule.generate_key(&table)?.ok_or_else(|| {
                            ShardingError::Config(format!(
                                "Table {} has no key generate strategy",
                                table
                            ))
                        })?;
                        keys.push(key.value);
                    }
                }
                (None, Some(name)) => {
                    let generator = rule.key_generator(&name).ok_or_else(|| {
                        ShardingError::Config(format!("Key generator '{}' is not declared", name))
                    })?;
                    for _ in 0..count {
                        keys.push(generator.generate_key()?);
                    }
                }
                (None, None) => {
                    return Err(ShardingError::Config(
                        "keygen needs --table or --generator".to_string(),
                    ))
                }
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }
    }

    Ok(())
}

/// Builds the statement context from `--table`, `--eq`, `--in` and `--range`.
///
/// All predicates on one table form a single AND-ed condition.
struct ArgsExtractor;

impl ConditionExtractor<RouteArgs> for ArgsExtractor {
    fn extract(&self, args: &RouteArgs) -> sharding_router::Result<StatementContext> {
        let mut predicates = Vec::new();
        for item in &args.eq {
            let (table, column, value) = split_predicate(item)?;
            let value = ShardingValue::from_literal(value);
            predicates.push((table, column, ConditionValue::Precise(value)));
        }
        for item in &args.in_list {
            let (table, column, values) = split_predicate(item)?;
            let values = values.split(',').map(ShardingValue::from_literal).collect();
            predicates.push((table, column, ConditionValue::List(values)));
        }
        for item in &args.range {
            let (table, column, bounds) = split_predicate(item)?;
            predicates.push((table, column, ConditionValue::Range(parse_range(bounds)?)));
        }

        let mut context = StatementContext::new(args.tables.iter().cloned());
        for (table, column, value) in predicates {
            match context.conditions.iter_mut().find(|c| c.applies_to(table)) {
                Some(condition) => condition.columns.push(ColumnCondition {
                    column: column.to_string(),
                    value,
                }),
                None => context
                    .conditions
                    .push(ShardingCondition::new(table).with(column, value)),
            }
        }
        Ok(context)
    }
}

/// Split `table=value`.
fn split_pair(pair: &str) -> Result<(&str, &str), ShardingError> {
    pair.split_once('=')
        .map(|(t, v)| (t.trim(), v.trim()))
        .filter(|(t, v)| !t.is_empty() && !v.is_empty())
        .ok_or_else(|| ShardingError::Config(format!("Expected table=value, got '{}'", pair)))
}

/// Split `table.column=value`.
fn split_predicate(item: &str) -> Result<(&str, &str, &str), ShardingError> {
    let (target, value) = split_pair(item)?;
    let (table, column) = target
        .split_once('.')
        .filter(|(t, c)| !t.is_empty() && !c.is_empty())
        .ok_or_else(|| {
            ShardingError::Config(format!("Expected table.column=value, got '{}'", item))
        })?;
    Ok((table, column, value))
}

/// Parse `lower..upper`; both bounds are inclusive and either may be empty.
fn parse_range(text: &str) -> Result<ShardingRange, ShardingError> {
    let (lower, upper) = text
        .split_once("..")
        .ok_or_else(|| ShardingError::Config(format!("Expected lower..upper, got '{}'", text)))?;
    let (lower, upper) = (lower.trim(), upper.trim());
    Ok(match (lower.is_empty(), upper.is_empty()) {
        (false, false) => ShardingRange::closed(
            ShardingValue::from_literal(lower),
            ShardingValue::from_literal(upper),
        ),
        (false, true) => ShardingRange::at_least(ShardingValue::from_literal(lower)),
        (true, false) => ShardingRange::at_most(ShardingValue::from_literal(upper)),
        (true, true) => ShardingRange::all(),
    })
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
