use anyhow::anyhow;
use anyhow::Result;

/// Classification of a fatal error, used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmoExitCode {
    /// Input image or bitstream was malformed or internally inconsistent.
    InvalidInput = 1,
    /// CLI configuration was missing a required path or had conflicting flags.
    InvalidConfiguration = 2,
    /// Everything else: I/O failure, internal invariant violation.
    Internal = 3,
}

impl PmoExitCode {
    pub fn as_process_code(self) -> i32 {
        self as i32
    }
}

/// Builds an `anyhow::Error` tagged with a `PmoExitCode` so `main` can map
/// it back to a process exit code without re-parsing the message text.
pub fn err_exit_code<T>(code: PmoExitCode, message: &str) -> Result<T> {
    Err(anyhow!("{:?}: {}", code, message))
}

/// Given an error produced anywhere in this crate, best-effort recover the
/// `PmoExitCode` it was tagged with, defaulting to `Internal` for errors
/// that originated outside our own `err_exit_code` call sites (e.g. a
/// bare `std::io::Error` propagated via `?`).
pub fn exit_code_of(err: &anyhow::Error) -> PmoExitCode {
    let msg = err.to_string();
    if msg.starts_with("InvalidInput:") {
        PmoExitCode::InvalidInput
    } else if msg.starts_with("InvalidConfiguration:") {
        PmoExitCode::InvalidConfiguration
    } else {
        PmoExitCode::Internal
    }
}
