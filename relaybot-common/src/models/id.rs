use std::fmt;
use serde::{Deserialize, Serialize};

/// Identity of a stored rule. Rows from the database keep their numeric key;
/// rules created at runtime without persistence get a process-local number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordId {
    Persisted(i64),
    Ephemeral(u64),
}

impl RecordId {
    pub fn persisted(&self) -> Option<i64> {
        match self {
            RecordId::Persisted(id) => Some(*id),
            RecordId::Ephemeral(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Persisted(id) => write!(f, "{}", id),
            RecordId::Ephemeral(id) => write!(f, "ephemeral-{}", id),
        }
    }
}
