//! rowbook - export SQL query results to styled .xlsx workbooks.

use rowbook::cli::{Cli, Command};
use rowbook::config::{Config, ConnectionConfig};
use rowbook::db;
use rowbook::error::{ExportError, Result};
use rowbook::export::{
    default_output_name, export_folder, export_folder_to_one, read_sql_file, ExportDriver,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    // Load configuration file
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // Build connection config with precedence:
    // 1. CLI arguments (highest)
    // 2. Named connection from config
    // 3. Default connection from config
    // 4. Environment variables
    let connection = resolve_connection(&cli, &config)?.ok_or_else(|| {
        ExportError::config(
            "No database connection configured. Provide --url, connection flags, \
             or a [connections.default] entry in the config file.",
        )
    })?;

    info!("Connecting to {}", connection.display_string());
    let client = db::connect(&connection).await?;

    let mut export_config = config.export.clone();
    export_config.apply_env_overrides();
    if let Command::Export {
        page_size,
        chunk_size,
        ..
    } = &cli.command
    {
        if let Some(n) = page_size {
            export_config.page_size = *n;
        }
        if let Some(n) = chunk_size {
            export_config.chunk_size = *n;
        }
    }

    // Ctrl-C requests cooperative cancellation; the current batch finishes
    // and the workbook is finalized with the rows written so far.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancellation requested, finishing current batch...");
                cancel.cancel();
            }
        });
    }

    let page_size = export_config.page_size;
    let driver = ExportDriver::new(client.as_ref(), export_config)
        .with_progress(|p| {
            println!(
                "  {} / {} rows ({:.0}%)",
                p.rows_processed,
                p.total_rows,
                p.percent()
            )
        })
        .with_notice(|msg| println!("{msg}"))
        .with_cancellation(cancel);

    let result = dispatch(&cli.command, &driver, page_size).await;

    if let Err(e) = client.close().await {
        error!("Failed to close connection: {e}");
    }

    result
}

async fn dispatch(command: &Command, driver: &ExportDriver<'_>, page_size: usize) -> Result<()> {
    match command {
        Command::Export {
            query,
            file,
            out,
            paged,
            ..
        } => {
            let sql = match (query, file) {
                (Some(q), None) => q.clone(),
                (None, Some(f)) => read_sql_file(f)?,
                (Some(_), Some(_)) => {
                    return Err(ExportError::config(
                        "Provide the query inline or via --file, not both",
                    ))
                }
                (None, None) => {
                    return Err(ExportError::config("No query provided. Pass SQL or --file"))
                }
            };

            let out_path = out
                .clone()
                .unwrap_or_else(|| PathBuf::from(default_output_name("export")));

            let outcome = if *paged {
                driver.export_paged(&sql, &out_path, page_size).await?
            } else {
                driver.export_streamed(&sql, &out_path).await?
            };
            println!("{}", outcome.summary());
        }

        Command::Batch {
            dir,
            out_dir,
            paged,
        } => {
            let outcomes = export_folder(driver, dir, out_dir, *paged, page_size).await?;
            println!(
                "Exported {} workbooks to {}",
                outcomes.len(),
                out_dir.display()
            );
        }

        Command::BatchOne { dir, out } => {
            let out_path = out.clone().unwrap_or_else(|| {
                let stem = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "combined".to_string());
                PathBuf::from(default_output_name(&stem))
            });

            let outcome = export_folder_to_one(driver, dir, &out_path).await?;
            println!("{}", outcome.summary());
        }
    }

    Ok(())
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    // Start with CLI connection config if provided
    let mut connection = cli.to_connection_config()?;

    // If no CLI connection, try named connection from config
    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(ExportError::config(format!(
                    "Connection '{name}' not found in config file"
                )));
            }
        }
    }

    // If still no connection, try default from config
    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    // Apply environment variable defaults
    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
