use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

// -------------- Run Signals --------------

/// Stop request flag. Set from the UI thread, observed by the run thread at
/// item boundaries. Set and clear are idempotent.
#[derive(Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cooperative pause gate. The run thread parks in `wait_until_released`
/// while the gate is held; releasing wakes it promptly.
pub struct PauseGate {
    held: Mutex<bool>,
    released: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        self.released.notify_all();
    }

    /// Flips the gate and returns true when it is now held.
    pub fn toggle(&self) -> bool {
        let mut held = self.held.lock();
        *held = !*held;
        if !*held {
            self.released.notify_all();
        }
        *held
    }

}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// The only mutable state shared between the UI and the run thread.
#[derive(Default)]
pub struct RunSignals {
    pub stop: StopFlag,
    pub pause: PauseGate,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// State a fresh run expects: stop cleared, gate released.
    pub fn reset(&self) {
        self.stop.clear();
        self.pause.release();
    }

    /// A stop while paused must wake the run thread rather than leave it
    /// parked on the gate forever.
    pub fn request_stop(&self) {
        self.stop.request();
        self.pause.release();
    }

    /// Flips the gate and returns true when it is now held. Refused once a
    /// stop is pending: the gate must never hold a stopped run.
    pub fn toggle_pause(&self) -> bool {
        if self.stop.is_requested() {
            return false;
        }
        self.pause.toggle()
    }

    /// Parks at an item boundary while the gate is held, waking as soon as
    /// the gate is released or a stop is requested.
    pub fn wait_at_boundary(&self) {
        let mut held = self.pause.held.lock();
        while *held && !self.stop.is_requested() {
            self.pause.released.wait(&mut held);
        }
    }
}
