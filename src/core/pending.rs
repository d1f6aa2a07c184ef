//! # Pending-events record shared by signal listeners and the control loop.
//!
//! Signal listeners only **raise** flags; the control loop **takes** them once per pass.
//!
//! ```text
//! SIGTERM/SIGINT ─► request_shutdown() ─┐
//! SIGHUP         ─► request_reload()   ─┤
//! SIGUSR1/2      ─► request_mode(m)    ─┼─► notify_one() ─► control loop wakes
//! SIGCHLD        ─► child_exited()     ─┘                   └─► take_*() (swap to "none")
//! ```
//!
//! ## Rules
//! - Flags are lock-free atomics; raising the same flag twice before a pass coalesces.
//! - For modes the last request wins.
//! - Shutdown is sticky: `take_shutdown` does not clear it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Notify;

use crate::mode::Mode;

/// Pending modes are stored as `Mode::to_u8() + 1`; zero means none.
const NO_MODE: u8 = 0;

/// Flags raised by signal listeners and consumed by the supervisor control loop.
#[derive(Debug, Default)]
pub struct PendingEvents {
    shutdown: AtomicBool,
    reload: AtomicBool,
    child_exited: AtomicBool,
    mode: AtomicU8,
    wake: Notify,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn request_mode(&self, mode: Mode) {
        self.mode.store(mode.to_u8() + 1, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn child_exited(&self) {
        self.child_exited.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// True once a shutdown was requested (never cleared).
    pub fn take_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    pub fn take_child_exited(&self) -> bool {
        self.child_exited.swap(false, Ordering::SeqCst)
    }

    pub fn take_mode(&self) -> Option<Mode> {
        match self.mode.swap(NO_MODE, Ordering::SeqCst) {
            NO_MODE => None,
            v => Some(Mode::from_u8(v - 1)),
        }
    }

    /// Completes when any flag is raised (or immediately if one was raised since the
    /// last wake-up).
    pub async fn notified(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_coalesce_and_clear() {
        let p = PendingEvents::new();
        assert!(!p.take_reload());
        p.request_reload();
        p.request_reload();
        assert!(p.take_reload());
        assert!(!p.take_reload());

        p.child_exited();
        assert!(p.take_child_exited());
        assert!(!p.take_child_exited());
    }

    #[test]
    fn last_mode_wins() {
        let p = PendingEvents::new();
        assert_eq!(p.take_mode(), None);
        p.request_mode(Mode::Light);
        p.request_mode(Mode::Heavy);
        assert_eq!(p.take_mode(), Some(Mode::Heavy));
        assert_eq!(p.take_mode(), None);
    }

    #[test]
    fn shutdown_is_sticky() {
        let p = PendingEvents::new();
        p.request_shutdown();
        assert!(p.take_shutdown());
        assert!(p.take_shutdown());
    }

    #[tokio::test]
    async fn raised_flag_wakes_waiter() {
        let p = PendingEvents::new();
        p.request_reload();
        tokio::time::timeout(Duration::from_millis(100), p.notified())
            .await
            .expect("stored permit wakes immediately");
    }
}
