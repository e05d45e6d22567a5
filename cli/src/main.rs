//! fieldtools CLI: driving adapter for the fieldtools engine.
//!
//! Subcommands:
//! - `check <tag>`: parse a validate tag, print its scopes and constraints
//! - `eval <tag> <value> [--scope s]`: check one value against a tag
//! - `access <tag> --principals a,b`: decode an access tag
//! - `fields <record>`: print a reference record's field table
//! - `info`: print registered tools, functions and built-in constraints

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use fieldtools::expr::builtin_names;
use fieldtools::{
    Catalog, CatalogBuilder, CatalogConfig, ConstraintRef, FieldTable, ScopeAliases, Value, WILDCARD_SCOPE,
};
use fieldtools_test::{Account, Address, Audit, Widget};
use tracing_subscriber::EnvFilter;

/// fieldtools - tag-driven field tooling
#[derive(Parser, Debug)]
#[command(name = "fieldtools")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Catalog configuration file (YAML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a validate tag and print its scoped constraints
    Check {
        /// Validate tag, e.g. `create:required;*:len(0,8)`
        tag: String,
    },

    /// Check one value against a validate tag
    Eval {
        /// Validate tag
        tag: String,

        /// Value; numbers and booleans are inferred
        value: String,

        /// Active scope
        #[arg(short, long, default_value = WILDCARD_SCOPE)]
        scope: String,
    },

    /// Decode an access tag into a permission table
    Access {
        /// Access tag, e.g. `rwr-,p`
        tag: String,

        /// Principals in bit order
        #[arg(short, long, value_delimiter = ',')]
        principals: Vec<String>,
    },

    /// Print the field table of a reference record
    Fields {
        /// One of: account, address, audit, widget
        record: String,
    },

    /// Print registered tools, functions and built-in constraints
    Info,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(&cli);

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let builder = base_builder(cli.config.as_deref())?;
    match &cli.command {
        Command::Check { tag } => cmd_check(&build_catalog(builder)?, tag),
        Command::Eval { tag, value, scope } => {
            let passed = cmd_eval(&build_catalog(builder)?, tag, value, scope)?;
            println!("{}", if passed { "pass" } else { "fail" });
            if passed {
                Ok(())
            } else {
                Err(format!("\"{value}\" does not satisfy \"{tag}\" in scope \"{scope}\""))
            }
        }
        Command::Access { tag, principals } => cmd_access(builder, tag, principals),
        Command::Fields { record } => cmd_fields(&build_catalog(builder)?, record),
        Command::Info => cmd_info(&build_catalog(builder)?),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_check(catalog: &Catalog, tag: &str) -> Result<(), String> {
    let groups = catalog
        .validation(tag)
        .map_err(|e| format!("tag invalid: {e}"))?;
    let rendered: Vec<serde_json::Value> = groups
        .iter()
        .map(|(scope, constraint)| serde_json::json!({ "scope": scope, "constraint": constraint.details() }))
        .collect();
    let json = serde_json::to_string_pretty(&rendered).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_eval(catalog: &Catalog, tag: &str, value: &str, scope: &str) -> Result<bool, String> {
    let groups = catalog
        .validation(tag)
        .map_err(|e| format!("tag invalid: {e}"))?;
    let value = Value::infer(value);
    tracing::debug!(scope, value = ?value, "evaluating");
    Ok(select(&groups, catalog.aliases(), scope).map_or(true, |c| c.test(&value)))
}

fn cmd_access(builder: CatalogBuilder, tag: &str, principals: &[String]) -> Result<(), String> {
    let catalog = builder
        .register_access_principals(principals.iter().cloned())
        .map_err(|e| e.to_string())?
        .build();
    let lines = describe_access(&catalog, tag)?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn cmd_fields(catalog: &Catalog, record: &str) -> Result<(), String> {
    let table = match record.to_ascii_lowercase().as_str() {
        "account" => catalog.introspect::<Account>(),
        "address" => catalog.introspect::<Address>(),
        "audit" => catalog.introspect::<Audit>(),
        "widget" => catalog.introspect::<Widget>(),
        other => return Err(format!("unknown record \"{other}\"")),
    }
    .map_err(|e| format!("introspection failed: {e}"))?;
    for line in describe_fields(&table) {
        println!("{line}");
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Uniform return type for all commands
fn cmd_info(catalog: &Catalog) -> Result<(), String> {
    println!("Tools:");
    for name in catalog.tool_names() {
        println!("  {name}");
    }

    println!("\nField functions:");
    for name in catalog.function_names() {
        println!("  {name}");
    }

    println!("\nBuilt-in constraints:");
    for name in builtin_names() {
        println!("  {name}");
    }

    println!("\nAccess principals:");
    for name in catalog.principals().names() {
        println!("  {name}");
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════════

/// Last group naming `scope`, else the last wildcard group. Group scopes and
/// `scope` both resolve through `aliases`.
fn select<'a>(groups: &'a [(String, ConstraintRef)], aliases: &ScopeAliases, scope: &str) -> Option<&'a ConstraintRef> {
    let last = |wanted: &str| {
        groups
            .iter()
            .rev()
            .find(|(s, _)| aliases.resolve(s) == wanted)
            .map(|(_, c)| c)
    };
    last(aliases.resolve(scope)).or_else(|| last(WILDCARD_SCOPE))
}

fn describe_access(catalog: &Catalog, tag: &str) -> Result<Vec<String>, String> {
    let principals = catalog.principals();
    let spec = principals
        .parse_tag(tag)
        .map_err(|e| format!("tag invalid: {e}"))?;
    let mut lines: Vec<String> = principals
        .describe(spec.mask)
        .into_iter()
        .map(|(name, kinds)| format!("{name:<12} {kinds}"))
        .collect();
    lines.push(format!("{:<12} {}", "provided", if spec.provided { "yes" } else { "no" }));
    Ok(lines)
}

fn describe_fields(table: &FieldTable) -> Vec<String> {
    table
        .fields()
        .iter()
        .map(|field| {
            let tools: Vec<&str> = table
                .tools()
                .filter(|tool| table.bucket(tool).any(|(f, _)| f.location == field.location))
                .collect();
            format!(
                "{:<20} {:<12} {:<6} [{}]",
                field.location,
                field.external_name,
                field.kind,
                tools.join(",")
            )
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog assembly (composition root)
// ═══════════════════════════════════════════════════════════════════════════════

fn base_builder(config: Option<&Path>) -> Result<CatalogBuilder, String> {
    match config {
        Some(path) => {
            let config = load_config(path)?;
            CatalogBuilder::from_config(&config).map_err(|e| format!("config invalid: {e}"))
        }
        None => Ok(CatalogBuilder::new()),
    }
}

fn build_catalog(builder: CatalogBuilder) -> Result<Catalog, String> {
    fieldtools_test::register(builder)
        .map(CatalogBuilder::build)
        .map_err(|e| format!("registration failed: {e}"))
}

fn load_config(path: &Path) -> Result<CatalogConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read \"{}\": {e}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| format!("JSON parse error: {e}"))
    } else {
        // Default to YAML (handles .yaml and .yml)
        serde_yaml::from_str(&content).map_err(|e| format!("YAML parse error: {e}"))
    }
}
