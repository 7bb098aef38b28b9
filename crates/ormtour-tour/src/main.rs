//! Runs the ormtour walkthrough and prints what each step observed.

use clap::Parser;
use ormtour::{Engine, EngineConfig};
use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the walkthrough.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database URL
    #[arg(long, default_value = "sqlite::memory:")]
    url: String,

    /// Log every SQL statement at INFO
    #[arg(long)]
    echo: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn print_step(title: &str, value: &impl Serialize) -> ormtour::Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| ormtour::Error::Custom(format!("Cannot render {title}: {e}")))?;
    println!("== {title}\n{body}\n");
    Ok(())
}

fn tour(engine: &Engine) -> ormtour::Result<()> {
    let report = ormtour_tour::run(engine)?;

    print_step("hello world", &report.greeting)?;
    print_step("schema", &report.schema)?;
    print_step("inserts", &report.inserted)?;
    print_step("text query", &report.queries.names)?;
    print_step("select name, id", &report.queries.names_and_ids)?;
    print_step("users joined to addresses", &report.queries.users_with_addresses)?;
    for row in &report.queries.email_counts {
        println!(
            "username: {} | number of email address: {}",
            row.name, row.email_count
        );
    }
    println!();
    print_step("scoped session ids", &report.scoped_user_ids)?;
    print_step("long-lived session", &report.session)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = EngineConfig::from_url(&args.url)
        .map(|config| config.echo(args.echo))
        .and_then(Engine::connect)
        .and_then(|engine| {
            let outcome = tour(&engine);
            let closed = engine.close();
            outcome.and(closed)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Walkthrough failed");
            ExitCode::FAILURE
        }
    }
}
