use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::prints;

/// Two interrupts within this window terminate the emulator.
pub const DOUBLE_TAP_WINDOW_MS: u64 = 1500;

/// Bridges the asynchronous user interrupt to the synchronous fetch
/// loop. The handler thread only ever touches these atomics; the
/// debugger observes the flag at the next pre-execute boundary.
pub struct BreakRequest {
    requested: AtomicBool,
    last_interrupt_ms: AtomicU64,
}

impl BreakRequest {
    pub fn new() -> Arc<Self> {
        Arc::new(BreakRequest {
            requested: AtomicBool::new(false),
            last_interrupt_ms: AtomicU64::new(0),
        })
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending break request.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Records an interrupt at `now_ms` and reports whether it is the
    /// second one inside the double-tap window.
    pub fn register_interrupt(&self, now_ms: u64) -> bool {
        let last = self.last_interrupt_ms.swap(now_ms, Ordering::SeqCst);
        last != 0 && now_ms.saturating_sub(last) < DOUBLE_TAP_WINDOW_MS
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Hooks the user-interrupt signal. One tap breaks into the debugger,
/// two taps in quick succession quit the emulator entirely.
pub fn install_handler(request: Arc<BreakRequest>) -> Result<(), ctrlc::Error> {
    prints!("Press CTRL-C to break execution and start debugging.\n");

    ctrlc::set_handler(move || {
        prints!("§R ");

        if request.register_interrupt(now_millis()) {
            exit(0);
        }

        prints!("\n-- Ctrl-C pressed. Breaking execution.\n");
        request.request();
    })?;

    info!("Interrupt handler installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes_the_request() {
        let request = BreakRequest::new();
        assert!(!request.take());
        request.request();
        assert!(request.take());
        assert!(!request.take());
    }

    #[test]
    fn double_tap_is_only_inside_the_window() {
        let request = BreakRequest::new();
        assert!(!request.register_interrupt(10_000));
        assert!(request.register_interrupt(10_000 + DOUBLE_TAP_WINDOW_MS - 1));

        let request = BreakRequest::new();
        assert!(!request.register_interrupt(10_000));
        assert!(!request.register_interrupt(10_000 + DOUBLE_TAP_WINDOW_MS));
    }

    #[test]
    fn first_interrupt_never_quits() {
        let request = BreakRequest::new();
        assert!(!request.register_interrupt(5));
    }
}
