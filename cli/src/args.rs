use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

/// Where the migration manifests live on disk.
#[derive(Args, Clone, Debug)]
pub struct SourceParams {
    /// Directory holding the migration manifests
    #[clap(env = "CATENA_MIGRATIONS_DIR", long, value_name = "PATH", default_value = "migrations")]
    pub migrations_dir: PathBuf,
}

/// How to reach the schema admin service of the target database.
#[derive(Args, Clone, Debug)]
pub struct DatabaseParams {
    /// Base URL of the schema admin endpoint
    #[clap(env = "CATENA_DATABASE_URL", long, value_name = "URL")]
    pub database_url: Url,

    /// Bearer token sent with every admin request
    #[clap(env = "CATENA_DATABASE_TOKEN", long, value_name = "TOKEN")]
    pub database_token: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "catena",
    author,
    version,
    about = "Ordered, reversible schema migrations for remote databases",
    long_about = "Catena keeps schema changes as a predecessor-linked chain of YAML manifests \
                  and replays them against a database in that exact order, recording each step \
                  so interrupted runs resume where they stopped."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a skeleton manifest chained after the current tail
    Generate {
        /// Human-readable summary, also used to derive the migration id
        #[clap(value_name = "DESCRIPTION")]
        description: String,

        #[command(flatten)]
        source: SourceParams,
    },

    /// Apply unapplied migrations in chain order
    Migrate {
        /// Stop after this migration instead of running to the tail
        #[clap(long, value_name = "ID")]
        target: Option<String>,

        #[command(flatten)]
        source: SourceParams,

        #[command(flatten)]
        database: DatabaseParams,
    },

    /// Revert applied migrations in reverse chain order, ending at the target
    Rollback {
        /// Oldest migration to revert, inclusive
        #[clap(long, value_name = "ID")]
        target: String,

        #[command(flatten)]
        source: SourceParams,

        #[command(flatten)]
        database: DatabaseParams,
    },

    /// List every migration in chain order with its recorded status
    Status {
        #[command(flatten)]
        source: SourceParams,

        #[command(flatten)]
        database: DatabaseParams,
    },
}
