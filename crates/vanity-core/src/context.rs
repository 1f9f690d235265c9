//! Cancellation and deadline signal threaded through a fetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<FetchContext>,
}

/// Cloneable cancellation handle.
///
/// Clones share the same flag. A [`child`](FetchContext::child) observes its
/// parent's cancellation but can also be cancelled on its own without
/// affecting the parent.
#[derive(Debug, Clone)]
pub struct FetchContext {
    inner: Arc<Inner>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// A context that reports cancellation once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), None)
    }

    fn build(deadline: Option<Instant>, parent: Option<FetchContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn child(&self) -> Self {
        Self::build(None, Some(self.clone()))
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(deadline) = self.inner.deadline
            && Instant::now() >= deadline
        {
            return true;
        }
        self.inner
            .parent
            .as_ref()
            .is_some_and(FetchContext::is_cancelled)
    }

    /// Fail with [`ErrorKind::Cancelled`] if the signal has fired.
    pub fn check(&self, op: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::new(op, ErrorKind::Cancelled));
        }
        Ok(())
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels the wrapped context when dropped.
///
/// Held by a fetch future so that abandoning the future stops the work it
/// started on the blocking pool.
#[derive(Debug)]
pub(crate) struct CancelOnDrop(pub(crate) FetchContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
