//! Execution engine: decide which migrations to run and drive them, one at a
//! time, against the remote database.
//!
//! A runner lives for one invocation. The chain, the session probe and the
//! remote status fetch each happen at most once, on first use. Before any
//! mutating step the recorded history is validated against the chain
//! (applied flags must form a prefix); plans are then a pure function of
//! chain, statuses, direction and target. Execution is strictly sequential
//! and every completed step is durably recorded before the next one starts,
//! so an interrupted run resumes exactly where it halted.

use std::collections::HashMap;
use std::fmt;

use catena_client::{ClientError, SchemaAdmin, StatusStore};

use crate::chain::{ChainError, MigrationChain};
use crate::migration::{Migration, MigrationId, SchemaOp};

/// Direction of a run: `Up` applies pending migrations, `Down` reverts
/// applied ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Whether a migration must already be applied to be selected.
    fn selects_applied(self) -> bool {
        matches!(self, Direction::Down)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Applied flag per chain id. Complete over the chain: ids the remote record
/// has never seen count as not applied.
pub type StatusMap = HashMap<MigrationId, bool>;

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub direction: Direction,
    pub executed: Vec<MigrationId>,
}

/// One row of the status listing, in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: MigrationId,
    pub description: Option<String>,
    pub applied: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Invalid {direction} target `{id}`: {reason}")]
    InvalidTarget { id: MigrationId, direction: Direction, reason: &'static str },

    #[error("Inconsistent history: `{applied}` is recorded applied after unapplied `{unapplied}`")]
    InconsistentHistory { applied: MigrationId, unapplied: MigrationId },

    #[error("Migration `{id}` failed ({direction})")]
    OperationFailed {
        id: MigrationId,
        direction: Direction,
        #[source]
        source: ClientError,
    },

    #[error("Status record unavailable: {0}")]
    Status(#[from] ClientError),
}

/// Chain and statuses, resolved once per runner.
#[derive(Debug)]
struct RunContext {
    chain: MigrationChain,
    statuses: StatusMap,
}

/// Drives migrations through a schema admin client `C`.
pub struct MigrationRunner<C> {
    client: C,
    migrations: Option<Vec<Migration>>,
    context: Option<RunContext>,
}

impl<C> MigrationRunner<C>
where
    C: SchemaAdmin + StatusStore,
{
    pub fn new(migrations: Vec<Migration>, client: C) -> Self {
        Self { client, migrations: Some(migrations), context: None }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Hand the client back, e.g. to rebuild a runner over the same database.
    pub fn into_client(self) -> C {
        self.client
    }

    /// Apply every pending migration, or only up to `target`.
    ///
    /// Halts at the first failing step; completed steps stay recorded, the
    /// failing and later ones stay pending. Re-invoking resumes from the
    /// first pending migration. An empty plan succeeds with zero steps.
    pub async fn migrate(&mut self, target: Option<&MigrationId>) -> Result<ExecutionReport, RunnerError> {
        self.run(Direction::Up, target).await
    }

    /// Revert applied migrations from the tail down to and including
    /// `target`. A target is always required; there is no implicit
    /// "revert everything".
    pub async fn rollback(&mut self, target: &MigrationId) -> Result<ExecutionReport, RunnerError> {
        self.run(Direction::Down, Some(target)).await
    }

    /// Check that the recorded history is consistent with the chain.
    pub async fn validate(&mut self) -> Result<(), RunnerError> {
        let (_, context) = self.context().await?;
        validate_history(context)
    }

    /// Per-migration status rows for display, validated first.
    pub async fn status(&mut self) -> Result<Vec<MigrationStatus>, RunnerError> {
        let (_, context) = self.context().await?;
        validate_history(context)?;
        Ok(context
            .chain
            .iter()
            .map(|migration| MigrationStatus {
                id: migration.id.clone(),
                description: migration.description.clone(),
                applied: context.statuses.get(&migration.id).copied().unwrap_or(false),
            })
            .collect())
    }

    async fn run(&mut self, direction: Direction, target: Option<&MigrationId>) -> Result<ExecutionReport, RunnerError> {
        let (client, context) = self.context().await?;
        validate_history(context)?;
        let plan = plan(context, direction, target)?;

        tracing::info!("🔄 Starting {} run: {} step(s) planned", direction, plan.len());

        let mut executed = Vec::with_capacity(plan.len());
        for position in plan {
            let Some(migration) = context.chain.get(position) else { continue };
            let id = migration.id.clone();
            let op = match direction {
                Direction::Up => &migration.up,
                Direction::Down => &migration.down,
            };

            tracing::info!("📦 Running migration `{}` ({})", id, direction);
            execute_op(client, &id, direction, op).await?;

            // Durable progress record, written before the next step starts.
            let now_applied = direction == Direction::Up;
            client
                .record_status(id.as_str(), now_applied)
                .await
                .map_err(|source| RunnerError::OperationFailed { id: id.clone(), direction, source })?;
            context.statuses.insert(id.clone(), now_applied);

            tracing::info!("✅ Migration `{}` completed", id);
            executed.push(id);
        }

        tracing::info!("🎉 {} run completed: {} step(s) executed", direction, executed.len());
        Ok(ExecutionReport { direction, executed })
    }

    /// Resolve the chain and status record, once. The session probe runs
    /// before the first status fetch. The migration set is released only
    /// after the whole resolution succeeds; a failed attempt can be
    /// retried on the same runner.
    async fn context(&mut self) -> Result<(&mut C, &mut RunContext), RunnerError> {
        let Self { client, migrations, context } = &mut *self;
        if context.is_none() {
            let chain = MigrationChain::build(migrations.clone().unwrap_or_default())?;
            client.health_check().await?;
            let recorded = client.migration_statuses().await?;
            let statuses = chain
                .iter()
                .map(|migration| {
                    let applied = recorded.get(migration.id.as_str()).copied().unwrap_or(false);
                    (migration.id.clone(), applied)
                })
                .collect();
            tracing::debug!("Resolved migration chain ({} migration(s))", chain.len());
            *migrations = None;
            *context = Some(RunContext { chain, statuses });
        }
        let context = context.as_mut().expect("initialized above");
        Ok((client, context))
    }
}

async fn execute_op<C: SchemaAdmin>(
    client: &C,
    id: &MigrationId,
    direction: Direction,
    op: &SchemaOp,
) -> Result<(), RunnerError> {
    let Some(statements) = op.statements() else {
        // NoOp and empty batches succeed without a remote call.
        return Ok(());
    };
    client.apply_ddl(statements).await.map_err(|source| {
        tracing::error!("❌ Migration `{}` failed ({}): {}", id, direction, source);
        RunnerError::OperationFailed { id: id.clone(), direction, source }
    })
}

/// Applied flags must form a prefix of the chain: once one migration is
/// pending, everything after it must be pending too.
fn validate_history(context: &RunContext) -> Result<(), RunnerError> {
    let mut first_unapplied: Option<&MigrationId> = None;
    for migration in context.chain.iter() {
        let applied = context.statuses.get(&migration.id).copied().unwrap_or(false);
        match (applied, first_unapplied) {
            (true, Some(unapplied)) => {
                return Err(RunnerError::InconsistentHistory {
                    applied: migration.id.clone(),
                    unapplied: unapplied.clone(),
                })
            }
            (false, None) => first_unapplied = Some(&migration.id),
            _ => {}
        }
    }
    Ok(())
}

/// Select the chain positions to execute: walk forward for `Up`, backward
/// for `Down`, keep entries whose applied flag matches the direction's
/// eligibility, stop after (and including) `target`.
fn plan(context: &RunContext, direction: Direction, target: Option<&MigrationId>) -> Result<Vec<usize>, RunnerError> {
    if let Some(target) = target {
        if context.chain.position_of(target).is_none() {
            return Err(RunnerError::InvalidTarget {
                id: target.clone(),
                direction,
                reason: "not in the migration chain",
            });
        }
    }

    let walk: Vec<usize> = match direction {
        Direction::Up => (0..context.chain.len()).collect(),
        Direction::Down => (0..context.chain.len()).rev().collect(),
    };

    let mut selected = Vec::new();
    for position in walk {
        let Some(migration) = context.chain.get(position) else { continue };
        let applied = context.statuses.get(&migration.id).copied().unwrap_or(false);
        let eligible = applied == direction.selects_applied();
        let is_target = target == Some(&migration.id);

        if eligible {
            selected.push(position);
            if is_target {
                return Ok(selected);
            }
        } else if is_target {
            let reason = match direction {
                Direction::Up => "already applied",
                Direction::Down => "not applied",
            };
            return Err(RunnerError::InvalidTarget { id: migration.id.clone(), direction, reason });
        }
    }

    match target {
        // The walk ran out before reaching an eligible target.
        Some(target) => Err(RunnerError::InvalidTarget {
            id: target.clone(),
            direction,
            reason: "never became eligible",
        }),
        None => Ok(selected),
    }
}
