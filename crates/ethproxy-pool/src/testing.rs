//! Scripted in-memory upstreams for tests.
//!
//! A `MockUpstream` answers with a fixed height and balance, can be
//! switched between healthy and failing at runtime, and can delay its
//! answers to exercise timeouts and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use ethproxy_types::{Address, BlockRef, Wei};

use crate::error::UpstreamError;
use crate::upstream::{Upstream, UpstreamFuture};

#[derive(Debug, Default)]
pub struct MockUpstream {
    height: AtomicU64,
    balance: AtomicU64,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    closed: AtomicBool,
    height_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl MockUpstream {
    /// An upstream that answers every query.
    pub fn healthy(height: u64, balance: u64) -> Arc<Self> {
        let mock = Self::default();
        mock.height.store(height, Ordering::SeqCst);
        mock.balance.store(balance, Ordering::SeqCst);
        Arc::new(mock)
    }

    /// An upstream whose every query fails with a transport error.
    pub fn failing() -> Arc<Self> {
        let mock = Self::default();
        mock.failing.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, value: T) -> Result<T, UpstreamError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(UpstreamError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport("mock upstream failure".to_string()));
        }
        Ok(value)
    }
}

impl Upstream for MockUpstream {
    fn current_height(&self) -> UpstreamFuture<'_, u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let height = self.height.load(Ordering::SeqCst);
            self.answer(height).await
        })
    }

    fn balance_at(&self, _account: Address, _block: BlockRef) -> UpstreamFuture<'_, Wei> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let balance = Wei::from(self.balance.load(Ordering::SeqCst));
            self.answer(balance).await
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
