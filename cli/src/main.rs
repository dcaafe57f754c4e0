//! `catena` binary: schema migrations driven from the command line.

#![allow(clippy::print_stdout)]

mod args;

use anyhow::Context;
use args::{Cli, Command, DatabaseParams, SourceParams};
use catena_client::HttpAdminClient;
use catena_core::{ExecutionReport, MigrationDir, MigrationId, MigrationRunner};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    match Cli::parse().command {
        Command::Generate { description, source } => generate(&description, &source),
        Command::Migrate { target, source, database } => migrate(target, &source, &database).await,
        Command::Rollback { target, source, database } => rollback(&target, &source, &database).await,
        Command::Status { source, database } => status(&source, &database).await,
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}

fn generate(description: &str, source: &SourceParams) -> anyhow::Result<()> {
    let path = MigrationDir::new(&source.migrations_dir)
        .generate(description)
        .context("generating migration manifest")?;
    println!("{}", path.display());
    Ok(())
}

async fn migrate(target: Option<String>, source: &SourceParams, database: &DatabaseParams) -> anyhow::Result<()> {
    let mut runner = runner(source, database)?;
    let target = target.map(MigrationId::from);
    let report = runner.migrate(target.as_ref()).await.context("applying migrations")?;
    println!("{}", summarize(&report));
    Ok(())
}

async fn rollback(target: &str, source: &SourceParams, database: &DatabaseParams) -> anyhow::Result<()> {
    let mut runner = runner(source, database)?;
    let report = runner.rollback(&MigrationId::from(target)).await.context("reverting migrations")?;
    println!("{}", summarize(&report));
    Ok(())
}

/// One-line completion summary of a run.
fn summarize(report: &ExecutionReport) -> String {
    match report.executed.as_slice() {
        [] => format!("No {} steps to execute", report.direction),
        executed => {
            let ids = executed.iter().map(MigrationId::as_str).collect::<Vec<_>>().join(", ");
            format!("Executed {} {} step(s): {ids}", executed.len(), report.direction)
        }
    }
}

async fn status(source: &SourceParams, database: &DatabaseParams) -> anyhow::Result<()> {
    let mut runner = runner(source, database)?;
    let rows = runner.status().await.context("fetching migration status")?;

    let mut pending = 0usize;
    for row in &rows {
        let marker = if row.applied {
            "applied"
        } else {
            pending += 1;
            "pending"
        };
        match &row.description {
            Some(description) => println!("{marker}  {}  {description}", row.id),
            None => println!("{marker}  {}", row.id),
        }
    }
    println!("{} migration(s), {pending} pending", rows.len());
    Ok(())
}

/// Loads the manifest directory and wires the runner to the admin endpoint.
fn runner(source: &SourceParams, database: &DatabaseParams) -> anyhow::Result<MigrationRunner<HttpAdminClient>> {
    let migrations = MigrationDir::new(&source.migrations_dir)
        .load()
        .with_context(|| format!("loading migrations from `{}`", source.migrations_dir.display()))?;

    let mut client = HttpAdminClient::new(database.database_url.clone()).context("building admin client")?;
    if let Some(token) = &database.database_token {
        client = client.with_bearer_token(token);
    }

    Ok(MigrationRunner::new(migrations, client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_core::Direction;

    #[test]
    fn summaries_name_the_executed_steps() {
        let report = ExecutionReport {
            direction: Direction::Up,
            executed: vec!["20260101000000_users".into(), "20260102000000_posts".into()],
        };
        assert_eq!(summarize(&report), "Executed 2 up step(s): 20260101000000_users, 20260102000000_posts");

        let idle = ExecutionReport { direction: Direction::Down, executed: Vec::new() };
        assert_eq!(summarize(&idle), "No down steps to execute");
    }
}
