// In-process execution of map and reduce, used when no worker can do the work

use crate::error::ComputeError;
use crate::wordcount::{self, Counts, map_fragment};

/// Computes exactly what a healthy worker would, without leaving the process.
///
/// The scheduler treats the output of a fallback and of a remote worker as
/// interchangeable, so implementations must be deterministic.
pub trait FallbackExecutor: Send + Sync {
    fn map(&self, fragment: &str) -> Result<Counts, ComputeError>;

    fn reduce(&self, partials: &[Counts]) -> Result<Counts, ComputeError>;
}

/// The word-count computation, run locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl FallbackExecutor for LocalExecutor {
    fn map(&self, fragment: &str) -> Result<Counts, ComputeError> {
        Ok(map_fragment(fragment))
    }

    fn reduce(&self, partials: &[Counts]) -> Result<Counts, ComputeError> {
        wordcount::reduce_partials(partials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_map_matches_worker_computation() {
        let exec = LocalExecutor::new();
        let text = "Hola hola mundo mundo mundo";
        assert_eq!(exec.map(text).unwrap(), map_fragment(text));
    }

    #[test]
    fn test_local_reduce_merges() {
        let exec = LocalExecutor::new();
        let partials = vec![map_fragment("a b"), map_fragment("b c")];
        let merged = exec.reduce(&partials).unwrap();
        assert_eq!(merged.get("b"), Some(&2));
        assert_eq!(merged.len(), 3);
    }
}
