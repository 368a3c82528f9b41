//! Cleanup of everything a job writes into the engine filesystem.

use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};

/// Outcome of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Names that were deleted.
    pub removed: Vec<String>,
    /// Names that were already gone.
    pub already_absent: Vec<String>,
    /// Names whose deletion failed, with the cause.
    pub failed: Vec<(String, EngineError)>,
}

impl CleanupReport {
    /// Whether every registered name is gone.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks names written during a job and deletes each exactly once.
#[derive(Debug, Default)]
pub struct CleanupCoordinator {
    // Insertion order, no duplicates.
    pending: Vec<String>,
}

impl CleanupCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a name for deletion. Returns `false` if it was already registered.
    pub fn register(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.pending.contains(&name) {
            return false;
        }
        self.pending.push(name);
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.pending.iter().any(|n| n == name)
    }

    /// Names still awaiting deletion.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deletes one name now and stops tracking it.
    ///
    /// An already absent file is not an error.
    pub async fn release<E: Engine + ?Sized>(
        &mut self,
        engine: &E,
        name: &str,
    ) -> Result<(), EngineError> {
        self.pending.retain(|n| n != name);
        match engine.delete(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Attempts deletion of every registered name.
    ///
    /// Individual failures are collected and logged; they never stop the pass.
    pub async fn finalize<E: Engine + ?Sized>(&mut self, engine: &E) -> CleanupReport {
        let mut report = CleanupReport::default();

        for name in std::mem::take(&mut self.pending) {
            match engine.delete(&name).await {
                Ok(()) => {
                    debug!("Removed {}", name);
                    report.removed.push(name);
                }
                Err(e) if e.is_not_found() => report.already_absent.push(name),
                Err(e) => {
                    warn!("Failed to remove {}: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }

        report
    }
}
