//! Pooled scanner contexts.
//!
//! Worker threads check a context out for each range and the guard returns
//! it on drop, success, error, or cancellation unwind alike. The pool grows
//! on demand up to the worker count and never blocks a checkout.

use super::ScannerContext;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ScannerPool {
    free: Mutex<Vec<ScannerContext>>,
}

impl ScannerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a context out, creating one when the free list is empty.
    pub fn checkout(&self) -> PooledScanner<'_> {
        let context = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default();
        PooledScanner {
            pool: self,
            context: Some(context),
        }
    }

    fn give_back(&self, context: ScannerContext) {
        if let Ok(mut free) = self.free.lock() {
            free.push(context);
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// Checkout guard; derefs to the context and returns it to the pool on drop.
#[derive(Debug)]
pub struct PooledScanner<'a> {
    pool: &'a ScannerPool,
    context: Option<ScannerContext>,
}

impl Deref for PooledScanner<'_> {
    type Target = ScannerContext;

    fn deref(&self) -> &ScannerContext {
        self.context.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledScanner<'_> {
    fn deref_mut(&mut self) -> &mut ScannerContext {
        self.context.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledScanner<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.give_back(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_returns_on_drop() {
        let pool = ScannerPool::new();
        assert_eq!(pool.idle_count(), 0);
        {
            let _a = pool.checkout();
            let _b = pool.checkout();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 2);
        {
            let _c = pool.checkout();
            assert_eq!(pool.idle_count(), 1);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn context_returns_even_after_panic() {
        let pool = ScannerPool::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = pool.checkout();
            panic!("worker failed");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle_count(), 1);
    }
}
