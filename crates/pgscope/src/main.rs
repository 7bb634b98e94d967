// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! pgscope - transaction-scoped PostgreSQL connections.
//!
//! This is the binary entry point: connectivity diagnostics, catalog lookups,
//! and one-off statements run through the same registry and lifecycle
//! adapter that library users get.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod doctor;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pgscope_config::{ConfigError, PgScopeConfig};

/// pgscope - transaction-scoped PostgreSQL connections.
#[derive(Parser, Debug)]
#[command(name = "pgscope", version, about, long_about = None)]
struct Cli {
    /// Load this TOML file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check configuration, connectivity, and transaction handling.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// List the columns of a table that can be written explicitly.
    Columns {
        table: String,
        /// Schema to look in (defaults to pool.schema).
        #[arg(long)]
        schema: Option<String>,
    },
    /// Print the columns of a table's first unique, non-primary index.
    UniqueKey { table: String },
    /// Run one statement in its own transaction and print the rows as JSON.
    Query {
        sql: String,
        /// Positional parameter ($1, $2, ...). Parsed as JSON, else taken as text.
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
        /// Roll the transaction back instead of committing.
        #[arg(long)]
        rollback: bool,
    },
    /// Print the effective configuration with secrets masked.
    Config,
}

fn load_config(path: Option<&Path>) -> Result<PgScopeConfig, Vec<ConfigError>> {
    match path {
        Some(path) => pgscope_config::load_and_validate_path(path),
        None => pgscope_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            pgscope_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);

    let result = match cli.command {
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, plain).await,
        Some(Commands::Columns { table, schema }) => {
            commands::run_columns(&config, &table, schema.as_deref()).await
        }
        Some(Commands::UniqueKey { table }) => commands::run_unique_key(&config, &table).await,
        Some(Commands::Query {
            sql,
            params,
            rollback,
        }) => commands::run_query(&config, &sql, &params, rollback).await,
        Some(Commands::Config) => commands::run_config(&config),
        None => {
            println!("pgscope: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pgscope={log_level},sqlx::postgres::notice=info,warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
