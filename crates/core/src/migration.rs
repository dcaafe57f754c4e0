//! Migration model: identifiers, schema operations, migration records.

use std::fmt;

/// Opaque migration identifier.
///
/// Ids only participate in equality and predecessor linkage; chain order
/// never derives from the id text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationId(String);

impl MigrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MigrationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MigrationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Forward or backward action of one migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOp {
    /// Nothing to run; the step succeeds without touching the database.
    NoOp,
    /// A statement batch applied remotely as one schema admin call.
    Ddl(Vec<String>),
}

impl SchemaOp {
    /// Empty batches collapse to [`SchemaOp::NoOp`].
    pub fn from_statements(statements: Vec<String>) -> Self {
        if statements.is_empty() {
            SchemaOp::NoOp
        } else {
            SchemaOp::Ddl(statements)
        }
    }

    /// The statements to send, or `None` when there is nothing to run.
    pub fn statements(&self) -> Option<&[String]> {
        match self {
            SchemaOp::NoOp => None,
            SchemaOp::Ddl(statements) if statements.is_empty() => None,
            SchemaOp::Ddl(statements) => Some(statements),
        }
    }
}

/// One schema migration. Immutable once loaded.
///
/// `prev_id == None` marks the first migration of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: MigrationId,
    pub prev_id: Option<MigrationId>,
    pub description: Option<String>,
    pub up: SchemaOp,
    pub down: SchemaOp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batches_collapse_to_noop() {
        assert_eq!(SchemaOp::from_statements(Vec::new()), SchemaOp::NoOp);
        assert_eq!(SchemaOp::NoOp.statements(), None);
        assert_eq!(SchemaOp::Ddl(Vec::new()).statements(), None);

        let op = SchemaOp::from_statements(vec!["DROP TABLE users".to_string()]);
        assert_eq!(op.statements().map(<[String]>::len), Some(1));
    }
}
