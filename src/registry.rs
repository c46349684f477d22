use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::interpreter::{Execution, ExecutionStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No active execution with id {id}")]
    NotFound { id: String },
    #[error("Execution {id} is already being resumed")]
    Busy { id: String },
    #[error("Execution {id} is in an inconsistent state after a failed resume")]
    Poisoned { id: String },
}

type RegistryResult<T> = std::result::Result<T, RegistryError>;

struct Entry {
    execution: Execution,
    last_used: Instant,
}

/// Suspended executions keyed by an opaque id. Each entry has its own lock, so resuming
/// one execution never waits on another; the outer map lock is only held for lookups.
pub struct ExecutionRegistry {
    entries: Mutex<HashMap<String, Arc<Mutex<Entry>>>>,
    ttl: Duration,
}

impl ExecutionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<Entry>>>> {
        // Entries are only inserted and removed under this lock, never half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores an execution and returns its freshly minted id.
    pub fn create(&self, execution: Execution) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = Entry {
            execution,
            last_used: Instant::now(),
        };
        self.map().insert(id.clone(), Arc::new(Mutex::new(entry)));
        info!(execution_id = %id, "execution registered");
        id
    }

    pub fn status(&self, id: &str) -> RegistryResult<ExecutionStatus> {
        self.with_execution(id, |execution| execution.status())
    }

    /// Runs `action` on the execution while holding its lock. A second caller arriving while
    /// the lock is held gets [`RegistryError::Busy`] instead of waiting. Executions that end
    /// up finished or failed are retired.
    pub fn with_execution<R>(
        &self,
        id: &str,
        action: impl FnOnce(&mut Execution) -> R,
    ) -> RegistryResult<R> {
        let entry = self
            .map()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;

        let mut guard = match entry.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(execution_id = %id, "rejected concurrent resume");
                return Err(RegistryError::Busy { id: id.to_string() });
            }
            Err(TryLockError::Poisoned(_)) => {
                self.retire(id, &entry);
                return Err(RegistryError::Poisoned { id: id.to_string() });
            }
        };
        let result = action(&mut guard.execution);
        guard.last_used = Instant::now();
        let status = guard.execution.status();
        drop(guard);

        if status.is_terminal() {
            self.retire(id, &entry);
            info!(execution_id = %id, ?status, "execution retired");
        }
        Ok(result)
    }

    /// Removes the entry for `id` if it is still the one we looked up.
    fn retire(&self, id: &str, entry: &Arc<Mutex<Entry>>) {
        let mut map = self.map();
        if map.get(id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            map.remove(id);
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.map().remove(id).is_some();
        if removed {
            info!(execution_id = %id, "execution removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drops executions idle for longer than the TTL as of `now`. Entries that are being
    /// resumed right now are kept.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut map = self.map();
        let before = map.len();
        map.retain(|id, entry| match entry.try_lock() {
            Ok(entry) => {
                let keep = now.saturating_duration_since(entry.last_used) <= self.ttl;
                if !keep {
                    info!(execution_id = %id, "expired idle execution");
                }
                keep
            }
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        });
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, remaining = map.len(), "swept execution registry");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser, tac};

    fn waiting(source: &str) -> Execution {
        let parsed = parser::parse_lexed(&lexer::tokenize(source));
        let mut execution = Execution::new(Arc::new(tac::generate(&parsed.program)), 1_000);
        assert!(execution.start().unwrap().is_waiting());
        execution
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let registry = ExecutionRegistry::new(Duration::from_secs(60));
        assert_eq!(
            registry.status("missing"),
            Err(RegistryError::NotFound {
                id: "missing".to_string()
            })
        );
        assert_eq!(
            registry.with_execution("missing", |_| ()).unwrap_err().to_string(),
            "No active execution with id missing"
        );
    }

    #[test]
    fn finished_executions_are_retired() {
        let registry = ExecutionRegistry::new(Duration::from_secs(60));
        let id = registry.create(waiting("var x = get(); show(x);"));
        assert_eq!(registry.status(&id), Ok(ExecutionStatus::WaitingForInput));

        let progress = registry
            .with_execution(&id, |execution| execution.resume("done"))
            .unwrap()
            .unwrap();
        assert_eq!(progress.output, vec!["done"]);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.status(&id),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn concurrent_resume_is_rejected() {
        let registry = ExecutionRegistry::new(Duration::from_secs(60));
        let id = registry.create(waiting("var x = get(); show(x);"));
        let nested = registry
            .with_execution(&id, |_| registry.with_execution(&id, |_| ()))
            .unwrap();
        assert_eq!(nested, Err(RegistryError::Busy { id: id.clone() }));
        assert_eq!(registry.status(&id), Ok(ExecutionStatus::WaitingForInput));
    }

    #[test]
    fn sweep_drops_idle_executions() {
        let registry = ExecutionRegistry::new(Duration::from_secs(30));
        let id = registry.create(waiting("var x = get();"));
        assert_eq!(registry.sweep_at(Instant::now()), 0);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.sweep_at(Instant::now() + Duration::from_secs(31)), 1);
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }
}
