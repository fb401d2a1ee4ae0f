//! Idempotent process-wide seeding of reference data.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

/// A write-once cell with double-checked initialization.
///
/// Readers take the fast path through the read lock. The first caller that
/// finds the cell empty takes the init mutex, re-checks, and runs the loader.
/// A loader error leaves the cell empty so a later call can retry.
#[derive(Debug)]
pub struct SeedCell<T> {
    value: RwLock<Option<Arc<T>>>,
    init: Mutex<()>,
}

impl<T> SeedCell<T> {
    /// Creates an empty cell, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// Returns the seeded value, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }

    /// Returns true once the cell has been seeded.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.value.read().is_some()
    }

    /// Returns the seeded value, running `loader` at most once across threads.
    pub fn get_or_seed<E, F>(&self, loader: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let _guard = self.init.lock();
        if let Some(value) = self.get() {
            return Ok(value);
        }

        debug!("Seeding reference data");
        let value = Arc::new(loader()?);
        *self.value.write() = Some(Arc::clone(&value));
        Ok(value)
    }
}

impl<T> Default for SeedCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_seeds_once_under_contention() {
        let cell = Arc::new(SeedCell::<Vec<String>>::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cell.get_or_seed(|| {
                        loads.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        Ok::<_, String>(vec!["rule".to_string()])
                    })
                    .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cell.is_seeded());
    }

    #[test]
    fn test_failed_seed_can_retry() {
        let cell = SeedCell::<u32>::new();
        let first: Result<_, String> = cell.get_or_seed(|| Err("offline".to_string()));
        assert!(first.is_err());
        assert!(!cell.is_seeded());

        let second: Result<_, String> = cell.get_or_seed(|| Ok(7));
        assert_eq!(*second.unwrap(), 7);
    }

    #[test]
    fn test_static_cell() {
        static CELL: SeedCell<&'static str> = SeedCell::new();
        let value = CELL.get_or_seed(|| Ok::<_, ()>("seeded")).unwrap();
        assert_eq!(*value, "seeded");
    }
}
