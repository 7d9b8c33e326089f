//! Completion handshake with the target process.
//!
//! The target learns the outcome of a checkpoint or restore from a single
//! queued real-time signal whose integer payload carries the result.

use std::io;

use crate::process::Pid;

/// Offset of the completion signal above `SIGRTMIN`.
const COMPLETION_SIGNAL_OFFSET: libc::c_int = 2;

/// The real-time signal reserved for completion notification.
pub fn completion_signal() -> libc::c_int {
    libc::SIGRTMIN() + COMPLETION_SIGNAL_OFFSET
}

/// Outcome delivered to the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSignal {
    payload: i32,
}

impl CompletionSignal {
    pub const SUCCESS: CompletionSignal = CompletionSignal { payload: 0 };
    pub const FAILURE: CompletionSignal = CompletionSignal { payload: -1 };

    /// Post-resume notifications may carry an application-chosen id.
    pub fn with_payload(payload: i32) -> Self {
        CompletionSignal { payload }
    }

    pub fn payload(self) -> i32 {
        self.payload
    }

    /// Queues the signal to `target`. Best effort: failures are logged by
    /// the caller and never retried.
    pub fn deliver(self, target: Pid) -> io::Result<()> {
        let value = payload_sigval(self.payload);
        let ret = unsafe { libc::sigqueue(target, completion_signal(), value) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("Sent completion {} to {}", self.payload, target);
        Ok(())
    }

    /// Delivers and reports a failed delivery. Returns whether it was sent.
    pub fn notify(self, target: Pid) -> bool {
        match self.deliver(target) {
            Ok(()) => true,
            Err(e) => {
                log::error!("sigqueue: {}", e);
                false
            }
        }
    }
}

/// Builds a `sigval` whose `sival_int` member holds `payload`.
///
/// The libc crate only exposes the pointer member, so the integer is written
/// at the start of the union as C does.
pub fn payload_sigval(payload: i32) -> libc::sigval {
    let mut value: libc::sigval = unsafe { std::mem::zeroed() };
    unsafe {
        std::ptr::write((&mut value as *mut libc::sigval).cast::<libc::c_int>(), payload);
    }
    value
}

/// Reads the `sival_int` member back out of a `sigval`.
pub fn sigval_payload(value: libc::sigval) -> i32 {
    unsafe { std::ptr::read((&value as *const libc::sigval).cast::<libc::c_int>()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_realtime() {
        let sig = completion_signal();
        assert!(sig >= libc::SIGRTMIN());
        assert!(sig <= libc::SIGRTMAX());
        assert_eq!(sig, libc::SIGRTMIN() + 2);
    }

    #[test]
    fn test_payloads() {
        assert_eq!(CompletionSignal::SUCCESS.payload(), 0);
        assert_eq!(CompletionSignal::FAILURE.payload(), -1);
        assert_eq!(CompletionSignal::with_payload(7).payload(), 7);
    }

    #[test]
    fn test_sigval_carries_int() {
        for payload in [0, -1, 7, i32::MAX, i32::MIN] {
            assert_eq!(sigval_payload(payload_sigval(payload)), payload);
        }
    }

    #[test]
    fn test_deliver_to_missing_process() {
        // Pids are capped well below i32::MAX on Linux.
        let err = CompletionSignal::FAILURE.deliver(i32::MAX).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
        assert!(!CompletionSignal::FAILURE.notify(i32::MAX));
    }
}
