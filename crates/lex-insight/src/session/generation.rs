//! Snapshot generations for cancel-and-restart profiling.
//!
//! Every dataset mutation advances a [`GenerationCounter`]. A long computation
//! holds a [`GenerationToken`] taken when it read its snapshot and checks it
//! at safe points; once the counter has moved on, the result is stale and is
//! discarded instead of applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{InsightError, Result};

/// Shared, monotonically increasing snapshot generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Start a new generation, invalidating all outstanding tokens.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Token for the current generation.
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            generation: self.current(),
            counter: Some(Arc::clone(&self.current)),
        }
    }
}

/// The generation a computation started from.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    counter: Option<Arc<AtomicU64>>,
}

impl GenerationToken {
    /// A token not tied to any counter; it never becomes stale.
    pub fn detached(generation: u64) -> Self {
        Self {
            generation,
            counter: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer generation has started.
    pub fn is_current(&self) -> bool {
        self.counter
            .as_ref()
            .is_none_or(|c| c.load(Ordering::SeqCst) == self.generation)
    }

    /// Fail with `Superseded` once a newer generation has started.
    pub fn check(&self) -> Result<()> {
        match &self.counter {
            Some(counter) => {
                let current = counter.load(Ordering::SeqCst);
                if current == self.generation {
                    Ok(())
                } else {
                    Err(InsightError::Superseded {
                        generation: self.generation,
                        current,
                    })
                }
            }
            None => Ok(()),
        }
    }
}

static_assertions::assert_impl_all!(GenerationCounter: Send, Sync);
static_assertions::assert_impl_all!(GenerationToken: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_goes_stale_on_advance() {
        let counter = GenerationCounter::new();
        let token = counter.token();
        assert!(token.is_current());
        assert!(token.check().is_ok());

        assert_eq!(counter.advance(), 1);
        assert!(!token.is_current());
        let err = token.check().unwrap_err();
        assert!(err.is_superseded());
        assert!(counter.token().is_current());
    }

    #[test]
    fn test_detached_token_is_always_current() {
        let token = GenerationToken::detached(7);
        assert_eq!(token.generation(), 7);
        assert!(token.is_current());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_counter_shared_across_threads() {
        let counter = GenerationCounter::new();
        let token = counter.token();
        let clone = counter.clone();
        std::thread::spawn(move || {
            clone.advance();
        })
        .join()
        .expect("Thread should not panic");
        assert!(!token.is_current());
        assert_eq!(counter.current(), 1);
    }
}
