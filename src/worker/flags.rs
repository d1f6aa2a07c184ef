//! Flags shared between a worker's signal listeners and its duty-cycle thread.
//!
//! Listeners write, the duty cycle reads between phases. All lock-free.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::mode::Mode;

#[derive(Debug)]
pub struct WorkerFlags {
    terminate: AtomicBool,
    reload: AtomicBool,
    mode: AtomicU8,
}

impl WorkerFlags {
    pub fn new(mode: Mode) -> Self {
        Self {
            terminate: AtomicBool::new(false),
            reload: AtomicBool::new(false),
            mode: AtomicU8::new(mode.to_u8()),
        }
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending reload request.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.to_u8(), Ordering::SeqCst);
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    /// True when a sleep phase should end early.
    #[inline]
    pub fn interrupted(&self) -> bool {
        self.is_terminating() || self.reload.load(Ordering::Relaxed)
    }
}

impl Default for WorkerFlags {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}
