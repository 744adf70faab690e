//! Command definitions, connection flag resolution and command execution for the
//! `pgwrap` binary.

use crate::config::{parse_port, required_var, ConnectionConfig, DEFAULT_TIMEZONE, TIMEZONE_VAR};
use crate::db::{Connector, InsertOutcome};
use crate::error::{AppError, Result};
use crate::models::Table;
use crate::sql::insert_statement;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::prompts::{render_table, spinner};

/// Run statements against PostgreSQL and generate INSERT statements from tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Command to run; starts the interactive menu when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Connection flags. Each one falls back to its libpq environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Database name (PGDATABASE)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// User name (PGUSER)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Password (PGPASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Server host (PGHOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port (PGPORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Session time zone (PGWRAP_TIMEZONE, default America/Sao_Paulo)
    #[arg(long, global = true)]
    pub timezone: Option<String>,
}

impl ConnectionArgs {
    /// Merges flags with the environment (after loading `.env`).
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        dotenv::dotenv().ok();

        let pick = |flag: &Option<String>, var: &str| match flag {
            Some(value) => Ok(value.clone()),
            None => required_var(var),
        };

        let port = match self.port {
            Some(port) => port,
            None => parse_port(&required_var("PGPORT")?)?,
        };
        let timezone = self
            .timezone
            .clone()
            .or_else(|| env::var(TIMEZONE_VAR).ok())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        Ok(ConnectionConfig::new(
            pick(&self.database, "PGDATABASE")?,
            pick(&self.user, "PGUSER")?,
            pick(&self.password, "PGPASSWORD")?,
            pick(&self.host, "PGHOST")?,
            port,
        )
        .with_timezone(timezone))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a SELECT and print the resulting table
    Select {
        /// Statement text
        query: String,

        /// Print the table as JSON instead of a grid
        #[arg(long)]
        json: bool,
    },

    /// Run an INSERT
    Insert {
        /// Statement text
        query: String,

        /// Print the first column of the first returned row (use with RETURNING)
        #[arg(long)]
        returning: bool,
    },

    /// Run an UPDATE (or any statement without a result set)
    Update {
        /// Statement text
        query: String,
    },

    /// Generate an INSERT statement from a JSON table file
    Generate(GenerateArgs),

    /// Run a SELECT and regenerate its rows as an INSERT into another table
    Copy(CopyArgs),

    /// Interactive menu
    Interactive,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// JSON file of the form {"columns": [...], "rows": [[...], ...]}
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target table name
    #[arg(short, long)]
    pub table: String,

    /// Restrict to these columns, in this order (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// SELECT statement producing the rows
    pub query: String,

    /// Target table name
    #[arg(short, long)]
    pub table: String,

    /// Insert the rows with bound parameters instead of printing the statement
    #[arg(long)]
    pub execute: bool,
}

/// CLI application state: connection settings and a lazily opened connection.
pub struct App {
    connection: ConnectionArgs,
    db: Option<Connector>,
}

impl App {
    pub fn new(connection: ConnectionArgs) -> Self {
        Self {
            connection,
            db: None,
        }
    }

    /// Opens the connection on first use.
    async fn connector(&mut self) -> Result<&mut Connector> {
        if self.db.is_none() {
            let config = self.connection.resolve()?;
            self.db = Some(Connector::connect(&config).await?);
        }
        self.db
            .as_mut()
            .ok_or_else(|| AppError::Cli("database connection unavailable".to_string()))
    }

    /// Closes the connection if one was opened.
    pub async fn shutdown(self) -> Result<()> {
        match self.db {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }

    /// Run one command
    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Select { query, json } => {
                let table = self.select(&query).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&table)?);
                } else {
                    println!("{}", render_table(&table));
                    println!("{}", format!("({} rows)", table.len()).dimmed());
                }
            },
            Commands::Insert { query, returning } => {
                let outcome = {
                    let pb = spinner("Running insert...")?;
                    let db = self.connector().await?;
                    let outcome = db.run_insert(&query, returning).await;
                    pb.finish_and_clear();
                    outcome?
                };
                println!("{}", describe_insert(&outcome).green());
            },
            Commands::Update { query } => {
                let pb = spinner("Running update...")?;
                let db = self.connector().await?;
                let affected = db.run_update(&query).await;
                pb.finish_and_clear();
                println!("{}", format!("{} rows affected", affected?).green());
            },
            Commands::Generate(args) => {
                let columns: Vec<&str> = args.columns.iter().map(String::as_str).collect();
                let sql = generate_from_file(&args.input, &args.table, &columns)?;
                println!("{}", sql);
            },
            Commands::Copy(args) => {
                let table = self.select(&args.query).await?;
                if args.execute {
                    let pb = spinner("Inserting rows...")?;
                    let db = self.connector().await?;
                    let inserted = db.insert_table(&args.table, &table).await;
                    pb.finish_and_clear();
                    println!(
                        "{}",
                        format!("Inserted {} rows into {}", inserted?, args.table).green()
                    );
                } else {
                    println!("{}", insert_statement(&table, &args.table)?);
                }
            },
            Commands::Interactive => {
                return Err(AppError::Cli(
                    "interactive mode cannot be nested".to_string(),
                ));
            },
        }
        Ok(())
    }

    async fn select(&mut self, query: &str) -> Result<Table> {
        let pb = spinner("Running select...")?;
        let db = self.connector().await?;
        let table = db.run_select(query).await;
        pb.finish_and_clear();
        table.map_err(|e| {
            error!("Select failed: {}", e);
            e
        })
    }
}

/// One-line summary of an insert outcome.
pub fn describe_insert(outcome: &InsertOutcome) -> String {
    match outcome {
        InsertOutcome::Applied { rows_affected } => format!("{} rows inserted", rows_affected),
        InsertOutcome::Returned(value) => format!("Returned: {}", value),
        InsertOutcome::NoRow => "Insert returned no row".to_string(),
    }
}

/// Reads a JSON table from `path` and renders it as an INSERT into `target`.
///
/// A non-empty `columns` list projects the table first.
pub fn generate_from_file(path: &Path, target: &str, columns: &[&str]) -> Result<String> {
    info!("Generating INSERT into {} from {}", target, path.display());

    let raw = fs::read_to_string(path)?;
    let mut table: Table = serde_json::from_str(&raw)?;
    if !columns.is_empty() {
        table = table.project(columns)?;
    }
    insert_statement(&table, target)
}
