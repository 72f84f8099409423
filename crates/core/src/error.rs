use crate::risk::SecurityRisk;

/// Flat error taxonomy for the enforcement core. One variant per failure kind,
/// not a hierarchy — callers match on the kind they care about and let the rest
/// propagate via `anyhow`.
#[derive(Debug, thiserror::Error)]
pub enum GitUpError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("external tool unavailable: {0}")]
    ExternalTool(String),

    #[error("security violations detected. operation '{operation}' blocked.\nfound {count} unresolved security violation(s).\nrun 'gitup security review' to address violations.")]
    SecurityViolation {
        operation: String,
        count: usize,
        violations: Vec<SecurityRisk>,
    },

    #[error("operation cancelled by user")]
    UserCancelled,
}

impl GitUpError {
    pub fn violations(&self) -> Option<&[SecurityRisk]> {
        match self {
            GitUpError::SecurityViolation { violations, .. } => Some(violations),
            _ => None,
        }
    }
}
