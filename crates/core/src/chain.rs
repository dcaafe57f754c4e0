//! Chain builder: resolve an unordered migration set into its unique linear
//! order.
//!
//! Every migration names its predecessor (`None` for the first one). The
//! builder walks those links from the virtual start: at each step exactly one
//! migration may claim the current tail as predecessor. Anything else, a
//! fork, a gap, a cycle, a missing start, is rejected with the offending ids
//! rather than guessed around.

use std::collections::{HashMap, HashSet};

use crate::migration::{Migration, MigrationId};

fn join_ids(ids: &[MigrationId]) -> String {
    ids.iter().map(MigrationId::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("No start migration: `{wanted_by}` references unknown predecessor `{missing_prev}` and no migration has a null predecessor")]
    NoStartMigration { wanted_by: MigrationId, missing_prev: MigrationId },

    #[error("Unclear successor after `{}`: both `{first}` and `{second}` claim it as predecessor", .prev.as_ref().map(MigrationId::as_str).unwrap_or("start"))]
    UnclearSuccessor { prev: Option<MigrationId>, first: MigrationId, second: MigrationId },

    #[error("No successor found after `{after}`; unplaced: {}", join_ids(.unplaced))]
    NoSuccessor { after: MigrationId, unplaced: Vec<MigrationId> },

    #[error("No valid migration order: predecessor links of {} close a cycle", join_ids(.unplaced))]
    NoValidOrder { unplaced: Vec<MigrationId> },

    #[error("Migration id `{id}` is defined more than once")]
    DuplicateId { id: MigrationId },
}

/// Validated linear migration sequence.
///
/// Entry 0 carries the null-predecessor sentinel and every later entry's
/// `prev_id` is the id of the entry before it. The arena plus id index make
/// positions (`usize`) cheap stable handles; nothing is reordered after
/// construction.
#[derive(Debug, Default)]
pub struct MigrationChain {
    ordered: Vec<Migration>,
    index: HashMap<MigrationId, usize>,
}

impl MigrationChain {
    /// Resolve the unique order of `migrations`, or diagnose why none exists.
    ///
    /// The walk starts at the virtual `None` root and repeatedly consumes the
    /// single migration whose `prev_id` matches the current tail. Input order
    /// does not influence the result.
    pub fn build(migrations: Vec<Migration>) -> Result<Self, ChainError> {
        let mut known: HashSet<MigrationId> = HashSet::with_capacity(migrations.len());
        for migration in &migrations {
            if !known.insert(migration.id.clone()) {
                return Err(ChainError::DuplicateId { id: migration.id.clone() });
            }
        }

        // Multimap keyed by predecessor, so forks stay observable.
        let mut by_prev: HashMap<Option<MigrationId>, Vec<usize>> = HashMap::new();
        for (position, migration) in migrations.iter().enumerate() {
            by_prev.entry(migration.prev_id.clone()).or_default().push(position);
        }

        let mut order: Vec<usize> = Vec::with_capacity(migrations.len());
        let mut tail: Option<MigrationId> = None;
        while let Some(candidates) = by_prev.remove(&tail) {
            match candidates.as_slice() {
                [] => break,
                [position] => {
                    order.push(*position);
                    tail = Some(migrations[*position].id.clone());
                }
                [first, second, ..] => {
                    return Err(ChainError::UnclearSuccessor {
                        prev: tail,
                        first: migrations[*first].id.clone(),
                        second: migrations[*second].id.clone(),
                    });
                }
            }
        }

        if order.len() == migrations.len() {
            // Reorder the arena to chain order.
            let mut rank = vec![0usize; migrations.len()];
            for (chain_position, original) in order.iter().enumerate() {
                rank[*original] = chain_position;
            }
            let mut entries: Vec<(usize, Migration)> = migrations.into_iter().enumerate().collect();
            entries.sort_by_key(|(original, _)| rank[*original]);
            let ordered: Vec<Migration> = entries.into_iter().map(|(_, migration)| migration).collect();
            let index = ordered.iter().enumerate().map(|(position, migration)| (migration.id.clone(), position)).collect();
            return Ok(Self { ordered, index });
        }

        let placed: HashSet<usize> = order.iter().copied().collect();
        let mut unplaced: Vec<MigrationId> = migrations
            .iter()
            .enumerate()
            .filter(|(position, _)| !placed.contains(position))
            .map(|(_, migration)| migration.id.clone())
            .collect();
        unplaced.sort();

        match order.last() {
            // The walk stalled mid-way: the tail has no successor while
            // migrations remain (gap or disconnected fragment).
            Some(last) => Err(ChainError::NoSuccessor { after: migrations[*last].id.clone(), unplaced }),
            // Nothing was placed, so no migration starts the chain. A
            // predecessor reference leaving the set means a headless
            // fragment; links that all resolve inside the set close a cycle.
            None => {
                let dangling = migrations.iter().find_map(|migration| {
                    migration
                        .prev_id
                        .as_ref()
                        .filter(|prev| !known.contains(*prev))
                        .map(|prev| (migration.id.clone(), prev.clone()))
                });
                match dangling {
                    Some((wanted_by, missing_prev)) => Err(ChainError::NoStartMigration { wanted_by, missing_prev }),
                    None => Err(ChainError::NoValidOrder { unplaced }),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Migrations in chain order.
    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.ordered.iter()
    }

    pub fn get(&self, position: usize) -> Option<&Migration> {
        self.ordered.get(position)
    }

    /// Position of `id` in the chain, if present.
    pub fn position_of(&self, id: &MigrationId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// The chain tail, `None` for an empty chain.
    pub fn last(&self) -> Option<&Migration> {
        self.ordered.last()
    }
}

impl<'a> IntoIterator for &'a MigrationChain {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
