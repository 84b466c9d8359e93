//! Cancellation for the delivery loop.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// A one-shot cancellation flag shared between a delivery loop and whoever may need to
/// stop it.
///
/// The loop checks the flag at the top of every iteration and races its pump sleep
/// against [`CancelToken::cancelled`], so a cancel lands within one iteration at most.
/// Once cancelled the token stays cancelled until [`CancelToken::reset`].
///
/// A token serves one client. The wakeup is a single-waiter [`Signal`], so when two
/// loops sleep on the same token only one is woken early; the other sees the flag at its
/// next iteration.
///
/// # Example
///
/// ```ignore
/// static CANCEL: CancelToken = CancelToken::new();
///
/// let mut client = BridgeClient::new(platform, Delay, options, handler)
///     .with_cancel_token(&CANCEL);
///
/// // From another task:
/// CANCEL.cancel();
/// ```
pub struct CancelToken {
    cancelled: AtomicBool,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            signal: Signal::new(),
        }
    }

    /// Request cancellation and wake a waiting loop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.signal.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arm the token for the next delivery.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        self.signal.reset();
    }

    /// Resolves once the token is cancelled. Only one task should wait at a time.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.signal.wait().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
