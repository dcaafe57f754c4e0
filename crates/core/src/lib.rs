//! Ordered, reversible schema migrations for a remote SQL database.
//!
//! A migration names its predecessor; [`chain::MigrationChain::build`]
//! resolves an unordered set of them into the unique linear chain or
//! diagnoses why none exists. [`runner::MigrationRunner`] drives the chain
//! against a database through the `catena-client` contracts: validate the
//! recorded history, plan the steps, execute them strictly in order and
//! durably record each one before the next. [`source::MigrationDir`] loads
//! migrations from YAML manifests and generates new skeletons onto the
//! chain tail.

pub mod chain;
pub mod migration;
pub mod runner;
pub mod source;

pub use chain::{ChainError, MigrationChain};
pub use migration::{Migration, MigrationId, SchemaOp};
pub use runner::{Direction, ExecutionReport, MigrationRunner, MigrationStatus, RunnerError, StatusMap};
pub use source::{MigrationDir, SourceError};
