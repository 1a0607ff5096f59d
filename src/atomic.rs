//! One-time initialization over a shared status word
//!
//! Many threads may race to initialize the same piece of global state. The first
//! caller to move the status word from `Uninitialized` to `Initializing` runs the
//! initializer; everyone else polls until the outcome is recorded, then receives
//! that same outcome. A failure is permanent for the lifetime of the status word.
//!
//! Polling sleeps for [`POLL_INTERVAL`] between reads, so this is meant for
//! startup paths. Callers on hot paths should keep the result themselves after
//! the first success.
//!
//! An initializer that panics counts as a failure: the status word moves to
//! `Failed` while the panic unwinds, and later callers get the error built from
//! [`InitPanicked`].
//!
//! The initializer must not itself initialize through the same status word, or
//! it will wait on itself forever.

use crate::error::InitError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Sleep between status reads while another thread is initializing.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of one initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtomicStatus {
    Uninitialized = 0,
    Initializing = 1,
    Failed = 2,
    Initialized = 3,
}

impl AtomicStatus {
    fn from_word(word: u8) -> Self {
        match word {
            0 => AtomicStatus::Uninitialized,
            1 => AtomicStatus::Initializing,
            2 => AtomicStatus::Failed,
            _ => AtomicStatus::Initialized,
        }
    }
}

/// Marker converted into the recorded error when an initializer panics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPanicked;

impl InitPanicked {
    pub const MESSAGE: &'static str = "initializer panicked";
}

impl From<InitPanicked> for String {
    fn from(_: InitPanicked) -> Self {
        InitPanicked::MESSAGE.to_string()
    }
}

/// Records `Failed` if dropped while still armed, which only happens when the
/// initializer unwinds.
struct UnwindGuard<'a, E: From<InitPanicked>> {
    init: &'a AtomicInit<E>,
    armed: bool,
}

impl<E: From<InitPanicked>> Drop for UnwindGuard<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.init.outcome.set(Err(E::from(InitPanicked)));
            self.init
                .status
                .store(AtomicStatus::Failed as u8, Ordering::Release);
            warn!("One-time initializer panicked");
        }
    }
}

/// A status word plus the recorded outcome of the initializer that ran for it.
///
/// Usable in a `static`.
pub struct AtomicInit<E> {
    status: AtomicU8,
    outcome: OnceLock<Result<(), E>>,
}

impl<E> AtomicInit<E> {
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(AtomicStatus::Uninitialized as u8),
            outcome: OnceLock::new(),
        }
    }

    /// Current state of the status word
    pub fn status(&self) -> AtomicStatus {
        AtomicStatus::from_word(self.status.load(Ordering::Acquire))
    }
}

impl<E> Default for AtomicInit<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + From<InitPanicked>> AtomicInit<E> {
    /// Run `init` exactly once across all callers sharing this status word.
    ///
    /// Every caller gets the outcome of the single run. If `init` panics, the
    /// panic propagates to the caller that ran it and everyone else gets
    /// `E::from(InitPanicked)`.
    pub fn init_once<F>(&self, init: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let won = self
            .status
            .compare_exchange(
                AtomicStatus::Uninitialized as u8,
                AtomicStatus::Initializing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            let mut guard = UnwindGuard {
                init: self,
                armed: true,
            };
            let result = init();
            guard.armed = false;
            let status = if result.is_ok() {
                AtomicStatus::Initialized
            } else {
                AtomicStatus::Failed
            };
            // Only the CAS winner reaches this point, so the cell is empty.
            let _ = self.outcome.set(result.clone());
            self.status.store(status as u8, Ordering::Release);
            debug!(?status, "One-time initialization finished");
            return result;
        }

        loop {
            match self.status() {
                AtomicStatus::Initialized | AtomicStatus::Failed => return self.recorded(),
                AtomicStatus::Initializing => std::thread::sleep(POLL_INTERVAL),
                AtomicStatus::Uninitialized => {
                    unreachable!("status word went back to Uninitialized")
                }
            }
        }
    }

    fn recorded(&self) -> Result<(), E> {
        match self.outcome.get() {
            Some(outcome) => outcome.clone(),
            None => unreachable!("status resolved without a recorded outcome"),
        }
    }
}

impl AtomicInit<String> {
    /// Same state machine as [`AtomicInit::init_once`], for call sites that
    /// report failure as a plain message.
    pub fn init_once_str<F>(&self, init: F) -> Result<(), String>
    where
        F: FnOnce() -> Result<(), String>,
    {
        self.init_once(init)
    }
}

/// Status word for initializers that report a structured [`InitError`].
pub type InitOnce = AtomicInit<InitError>;
