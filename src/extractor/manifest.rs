//! The upload receiver's manifest: the set of artifact paths it expects,
//! each tracked through `Pending → Received` (or `Missing`, for a
//! zero-length PUT). A single mutex guards it — the only shared state in
//! the receiver process.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Received,
    Missing,
}

pub struct Manifest {
    entries: Mutex<HashMap<String, EntryState>>,
}

impl Manifest {
    pub fn new(expected_paths: impl IntoIterator<Item = String>) -> Self {
        let entries = expected_paths
            .into_iter()
            .map(|p| (p, EntryState::Pending))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    /// Mark a path received (non-zero-length body) or missing (zero-length
    /// body). Returns `Conflict` if the path was already resolved — the
    /// at-most-once-write invariant.
    pub fn resolve(&self, path: &str, zero_length: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(path) {
            None => Err(Error::NotFound(format!(
                "path {path:?} is not in the upload manifest"
            ))),
            Some(EntryState::Pending) => {
                *entries.get_mut(path).unwrap() = if zero_length {
                    EntryState::Missing
                } else {
                    EntryState::Received
                };
                Ok(())
            }
            Some(_) => Err(Error::Conflict(format!(
                "path {path:?} was already received"
            ))),
        }
    }

    /// Every entry resolved, one way or another.
    pub fn is_complete(&self) -> bool {
        self.entries
            .lock()
            .unwrap()
            .values()
            .all(|s| *s != EntryState::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_resolve_is_conflict() {
        let m = Manifest::new(["/mnt/results/a".to_string()]);
        m.resolve("/mnt/results/a", false).unwrap();
        assert!(matches!(
            m.resolve("/mnt/results/a", false),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn zero_length_marks_missing_not_complete_blocking() {
        let m = Manifest::new(["/mnt/results/a".to_string(), "/mnt/results/b".to_string()]);
        assert!(!m.is_complete());
        m.resolve("/mnt/results/a", true).unwrap();
        assert!(!m.is_complete());
        m.resolve("/mnt/results/b", false).unwrap();
        assert!(m.is_complete());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let m = Manifest::new(["/mnt/results/a".to_string()]);
        assert!(matches!(
            m.resolve("/mnt/results/bogus", false),
            Err(Error::NotFound(_))
        ));
    }
}
