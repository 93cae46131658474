//! Cooperative Ctrl+C handling
//!
//! A process-wide counter is bumped by the SIGINT handler and read lock-free
//! between chunks. The first interrupt asks the user and lets the in-flight
//! transfer finish; the second forces an abort. Platforms without POSIX
//! signals get a stub that always reports [`Shutdown::Continue`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

static SIGINT_COUNT: AtomicU32 = AtomicU32::new(0);
static PROMPTED: AtomicBool = AtomicBool::new(false);

/// Shutdown state as seen by the engine between courier calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Continue,
    RequestedOnce,
    Forced,
}

#[cfg(unix)]
extern "C" fn on_sigint(_signo: libc::c_int) {
    SIGINT_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Install the SIGINT handler. Safe to call once at startup; transfers run
/// fine without it (the state just never leaves `Continue`).
#[cfg(unix)]
pub fn install() -> std::io::Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = on_sigint as extern "C" fn(libc::c_int) as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        if libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut()) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<()> {
    Ok(())
}

/// Current shutdown state. `RequestedOnce` is reported a single time; after
/// [`acknowledge`] the state reads `Continue` again until the next signal,
/// while the underlying count stays at one so a further Ctrl+C escalates.
pub fn state() -> Shutdown {
    let count = SIGINT_COUNT.load(Ordering::Relaxed);
    if count >= 2 {
        Shutdown::Forced
    } else if count == 1 && !PROMPTED.load(Ordering::Relaxed) {
        Shutdown::RequestedOnce
    } else {
        Shutdown::Continue
    }
}

/// Mark the first-interrupt prompt as delivered.
pub fn acknowledge() {
    PROMPTED.store(true, Ordering::Relaxed);
}

#[cfg(test)]
pub fn reset_for_test() {
    SIGINT_COUNT.store(0, Ordering::Relaxed);
    PROMPTED.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_escalates() {
        reset_for_test();
        assert_eq!(state(), Shutdown::Continue);

        SIGINT_COUNT.store(1, Ordering::Relaxed);
        assert_eq!(state(), Shutdown::RequestedOnce);

        // Acknowledged prompt stays sticky without re-prompting
        acknowledge();
        assert_eq!(state(), Shutdown::Continue);

        SIGINT_COUNT.store(2, Ordering::Relaxed);
        assert_eq!(state(), Shutdown::Forced);

        reset_for_test();
    }
}
