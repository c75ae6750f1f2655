//! Interrupt handling
//!
//! SIGINT/SIGTERM are consumed by a dedicated thread. Outside of a
//! long-running operation an interrupt ends the process cleanly; while an
//! operation is running the first interrupt only raises a cancellation flag
//! that scans and batched deletes check between pages/chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// What the signal thread should do with an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Stop the running operation at the next boundary
    Cancel,
    /// Leave the program
    Exit,
}

#[derive(Default)]
struct InterruptState {
    in_operation: AtomicBool,
    cancel_requested: AtomicBool,
}

/// Shared interrupt state between the controller and the signal thread
#[derive(Clone, Default)]
pub struct InterruptFlag {
    state: Arc<InterruptState>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an interruptible operation as running until the guard drops
    pub fn begin_operation(&self) -> OperationGuard<'_> {
        self.state.cancel_requested.store(false, Ordering::SeqCst);
        self.state.in_operation.store(true, Ordering::SeqCst);
        OperationGuard { flag: self }
    }

    /// Check if the running operation should stop
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancel_requested.load(Ordering::Relaxed)
    }

    /// Record an interrupt and decide how to react to it
    pub fn on_interrupt(&self) -> InterruptAction {
        let in_operation = self.state.in_operation.load(Ordering::SeqCst);
        if in_operation && !self.state.cancel_requested.swap(true, Ordering::SeqCst) {
            InterruptAction::Cancel
        } else {
            InterruptAction::Exit
        }
    }
}

/// Clears the in-operation state on drop
pub struct OperationGuard<'a> {
    flag: &'a InterruptFlag,
}

impl OperationGuard<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.flag.state.in_operation.store(false, Ordering::SeqCst);
        self.flag.state.cancel_requested.store(false, Ordering::SeqCst);
    }
}

/// Install the interrupt thread
///
/// Must run before any other thread is spawned: the signal mask set here is
/// inherited, so every thread leaves SIGINT/SIGTERM to `sigwait`.
#[cfg(unix)]
pub fn install_handler(flag: InterruptFlag) {
    use std::thread;

    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        libc::sigaddset(&mut mask, libc::SIGINT);
        libc::sigaddset(&mut mask, libc::SIGTERM);
        libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
    }

    thread::spawn(move || {
        let mask = unsafe {
            let mut mask: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut mask);
            libc::sigaddset(&mut mask, libc::SIGINT);
            libc::sigaddset(&mut mask, libc::SIGTERM);
            mask
        };

        loop {
            let mut sig: libc::c_int = 0;
            if unsafe { libc::sigwait(&mask, &mut sig) } != 0 {
                continue;
            }
            match flag.on_interrupt() {
                InterruptAction::Cancel => {
                    eprintln!("\nInterrupt received, stopping after the current batch...");
                }
                InterruptAction::Exit => {
                    eprintln!("\nGoodbye!");
                    std::process::exit(0);
                }
            }
        }
    });

    debug!("Interrupt handler installed");
}

#[cfg(not(unix))]
pub fn install_handler(_flag: InterruptFlag) {
    debug!("Interrupt handling not available on this platform");
}
