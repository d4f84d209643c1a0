//! Scoped execution handles for backup workers
//!
//! `ExecutionSlot` owns a worker-pool permit and the artifact's cancellation
//! registration; dropping it releases both on every exit path.
//! `ExecutionGuard` is the checkpoint handle the blocking packaging code
//! polls between files.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::error::{VaultError, VaultResult};
use crate::models::ArtifactId;

/// Cancellation tokens of accepted, unfinished backups
pub type TokenRegistry = Arc<Mutex<HashMap<ArtifactId, CancellationToken>>>;

/// A held worker slot
pub struct ExecutionSlot {
    artifact_id: ArtifactId,
    registry: TokenRegistry,
    _permit: OwnedSemaphorePermit,
}

impl ExecutionSlot {
    pub fn new(
        artifact_id: ArtifactId,
        registry: TokenRegistry,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            artifact_id,
            registry,
            _permit: permit,
        }
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        if let Ok(mut tokens) = self.registry.lock() {
            tokens.remove(&self.artifact_id);
        }
    }
}

/// Cancellation token plus deadline, checked at safe points
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    operation: &'static str,
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl ExecutionGuard {
    pub fn new(operation: &'static str, token: CancellationToken, timeout: Duration) -> Self {
        Self {
            operation,
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Fails with `Cancelled` or `Timeout` once either has happened
    pub fn checkpoint(&self) -> VaultResult<()> {
        if self.token.is_cancelled() {
            return Err(VaultError::Cancelled(format!(
                "{} cancelled by operator",
                self.operation
            )));
        }
        if Instant::now() >= self.deadline {
            return Err(VaultError::Timeout(format!(
                "{} exceeded its maximum duration of {}s",
                self.operation,
                self.timeout.as_secs()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Semaphore;

    #[test]
    fn test_checkpoint_reports_cancellation() {
        let token = CancellationToken::new();
        let guard = ExecutionGuard::new("Backup", token.clone(), Duration::from_secs(60));
        guard.checkpoint().unwrap();
        token.cancel();
        assert!(matches!(guard.checkpoint(), Err(VaultError::Cancelled(_))));
    }

    #[test]
    fn test_checkpoint_reports_timeout() {
        let guard = ExecutionGuard::new("Restore", CancellationToken::new(), Duration::ZERO);
        assert!(matches!(guard.checkpoint(), Err(VaultError::Timeout(_))));
    }

    #[test]
    fn test_slot_releases_permit_and_token() {
        let semaphore = Arc::new(Semaphore::new(1));
        let registry: TokenRegistry = Arc::default();
        let id = ArtifactId::new();
        registry.lock().unwrap().insert(id, CancellationToken::new());

        let permit = Arc::clone(&semaphore).try_acquire_owned().unwrap();
        let slot = ExecutionSlot::new(id, Arc::clone(&registry), permit);
        assert_eq!(semaphore.available_permits(), 0);

        drop(slot);
        assert_eq!(semaphore.available_permits(), 1);
        assert!(registry.lock().unwrap().is_empty());
    }
}
