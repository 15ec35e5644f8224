//! Named locks guarding the host's shared mutable resources: the UID
//! namespace and the subordinate-id registry.
//!
//! A process-wide registry of `tokio::sync::Mutex` handles, one per
//! named resource, lazily created and reused across calls so that
//! every caller in the process contends on the same lock rather than
//! a fresh one. Acquisition is FIFO per `tokio::sync::Mutex`'s own
//! fairness guarantee.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The three named locks the Mutation Engine acquires for
/// read-modify-write sequences against host-shared files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockName {
    /// Guards UID allocation scans against `usedUids()`.
    UidAllocation,
    /// Guards subordinate-range allocation scans.
    SubuidAllocation,
    /// Guards the subuid/subgid file read-append-rename sequence.
    SubidConfig,
}

impl LockName {
    fn as_str(self) -> &'static str {
        match self {
            Self::UidAllocation => "uid-allocation",
            Self::SubuidAllocation => "subuid-allocation",
            Self::SubidConfig => "subid-config",
        }
    }
}

type Registry = HashMap<&'static str, Arc<Mutex<()>>>;

fn registry() -> &'static std::sync::Mutex<Registry> {
    static REGISTRY: OnceLock<std::sync::Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| std::sync::Mutex::new(HashMap::new()))
}

fn handle_for(name: LockName) -> Arc<Mutex<()>> {
    let mut registry = registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    registry
        .entry(name.as_str())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// A held named lock. The lock is released when this guard drops.
pub type LockGuard = OwnedMutexGuard<()>;

/// Acquire the named lock, suspending until it is free.
pub async fn acquire(name: LockName) -> LockGuard {
    handle_for(name).lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_yields_the_same_underlying_mutex() {
        let a = handle_for(LockName::UidAllocation);
        let b = handle_for(LockName::UidAllocation);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_names_yield_distinct_mutexes() {
        let a = handle_for(LockName::UidAllocation);
        let b = handle_for(LockName::SubuidAllocation);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn second_acquire_waits_for_first_to_drop() {
        let first = acquire(LockName::SubidConfig).await;
        let second_acquired = Arc::new(tokio::sync::Mutex::new(false));
        let flag = second_acquired.clone();
        let waiter = tokio::spawn(async move {
            let _second = acquire(LockName::SubidConfig).await;
            *flag.lock().await = true;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!*second_acquired.lock().await);

        drop(first);
        waiter.await.unwrap();
        assert!(*second_acquired.lock().await);
    }
}
