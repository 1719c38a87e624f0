//! error kinds of database construction and genome profiling.
//!
//! Input errors fail the smallest affected unit (a genome, a locus), consistency errors
//! are never resolved silently, search errors are turned into "no hits" unless the
//! search backend cannot be run at all.

use std::path::PathBuf;

use thiserror::Error;

/// failures of the external alignment search
#[derive(Debug, Error)]
pub enum SearchError {
    /// the search program cannot be launched, the whole run must stop
    #[error("search backend unreachable ({program}) : {source}")]
    Unreachable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// the search ran but did not produce usable output
    #[error("search failed : {0}")]
    Failed(String),
} // end of SearchError

impl SearchError {
    /// true if the error must abort the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, SearchError::Unreachable { .. })
    }
} // end of impl SearchError

#[derive(Debug, Error)]
pub enum TypingError {
    /// unreadable file, unexpected table shape, missing column...
    #[error("invalid input {path:?} : {msg}")]
    Input { path: PathBuf, msg: String },
    /// an allele id already bound to another locus
    #[error("allele {allele_id} is bound to locus {bound}, refusing to bind it to {requested}")]
    Consistency {
        allele_id: String,
        bound: String,
        requested: String,
    },
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
} // end of TypingError

impl TypingError {
    pub fn input<P: Into<PathBuf>, S: Into<String>>(path: P, msg: S) -> Self {
        TypingError::Input {
            path: path.into(),
            msg: msg.into(),
        }
    }

    /// short name of the error kind, used in failure summaries
    pub fn kind(&self) -> &'static str {
        match self {
            TypingError::Input { .. } | TypingError::Csv(_) | TypingError::Json(_) => "input",
            TypingError::Consistency { .. } => "consistency",
            TypingError::Search(_) => "search",
            TypingError::Io(_) => "io",
        }
    }

    /// true if the error must abort the whole run instead of failing one unit
    pub fn is_fatal(&self) -> bool {
        match self {
            TypingError::Search(e) => e.is_fatal(),
            _ => false,
        }
    }
} // end of impl TypingError

/// A failed unit of work (a genome or a locus) kept for the end of run summary.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    /// genome id or locus id
    pub unit: String,
    pub kind: String,
    pub msg: String,
}

impl UnitFailure {
    pub fn new(unit: &str, err: &TypingError) -> Self {
        UnitFailure {
            unit: unit.to_string(),
            kind: err.kind().to_string(),
            msg: err.to_string(),
        }
    }
} // end of impl UnitFailure

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_search_is_fatal() {
        let err = TypingError::from(SearchError::Unreachable {
            program: "blastn".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        });
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "search");
        let err = TypingError::from(SearchError::Failed("exit status 2".to_string()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn consistency_is_its_own_kind() {
        let err = TypingError::Consistency {
            allele_id: "abc".to_string(),
            bound: "L1".to_string(),
            requested: "L2".to_string(),
        };
        assert_eq!(err.kind(), "consistency");
        let failure = UnitFailure::new("Genome_1", &err);
        assert!(failure.msg.contains("L1"));
        assert!(failure.msg.contains("L2"));
    }
} // end of mod tests
