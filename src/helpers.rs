use anyhow::Result;

use crate::error::{err_exit_code as make_err, PmoExitCode};

/// Captures the call site as a string for use as anyhow context, e.g.
/// `.context(here!())?`.
#[macro_export]
macro_rules! here {
    () => {
        concat!(file!(), ":", line!(), ":", column!())
    };
}

pub use crate::here;

/// Returns an error tagged with the given exit code and message, building
/// a classified, user-facing error.
pub fn err_exit_code<T>(code: PmoExitCode, message: &str) -> Result<T> {
    make_err(code, message)
}
