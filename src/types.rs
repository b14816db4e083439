//! NewType wrappers for the identifiers that flow through the coordinator.
//!
//! Job identifiers and worker endpoints are both plain strings on the wire;
//! wrapping them keeps a worker endpoint from being passed where a job id is
//! expected (and the other way round).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Identifier of a submitted job.
    ///
    /// Either supplied by the client in the submit body or generated as a
    /// UUID v4. Unique within one coordinator process.
    JobId
);

newtype_string!(
    /// Identity of a worker: its base endpoint URL (e.g. "http://10.0.0.5:8001").
    ///
    /// Workers are stateless with respect to jobs, so the endpoint is all the
    /// coordinator needs to know about them.
    WorkerId
);

impl JobId {
    /// Generate a fresh random job identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl WorkerId {
    /// Endpoint with any trailing slash removed, ready to have a path appended.
    pub fn base_url(&self) -> &str {
        self.0.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_creation() {
        let id = JobId::new("job-1");
        assert_eq!(id.as_str(), "job-1");
        assert_eq!(id.to_string(), "job-1");
    }

    #[test]
    fn test_generated_job_ids_differ() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_worker_id_serde() {
        let id = WorkerId::new("http://localhost:8001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"http://localhost:8001\"");

        let parsed: WorkerId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_worker_base_url_strips_slash() {
        let id = WorkerId::new("http://localhost:8001/");
        assert_eq!(id.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_borrow() {
        use std::borrow::Borrow;
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(JobId::new("abc"), 1);
        let id = JobId::new("abc");
        let s: &str = id.borrow();
        assert_eq!(map.get(s), Some(&1));
    }
}
