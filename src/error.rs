//! Error types used by multiple modules.
//!
//! There are two error types used widely within vrpd. The most important
//! is [`Failed`]. It indicates that an operation had to be aborted and
//! that all diagnostic information has already been logged, so callers
//! need not do anything further with it.
//!
//! Secondly, [`ExitError`] is used when the process should terminate. It
//! provides enough information to determine the exit code.

use log::error;


//------------ Failed --------------------------------------------------------

/// An operation has failed to complete.
///
/// Diagnostic information has been printed or logged, and the caller
/// can't really do anything to recover.
#[derive(Clone, Copy, Debug)]
pub struct Failed;


//------------ ExitError -----------------------------------------------------

/// An error happened that should lead to terminating the process.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened.
    ///
    /// This should be exit status 1.
    Generic,

    /// An object could not be validated.
    ///
    /// This should be exit status 2.
    Invalid,
}

impl ExitError {
    /// Returns the exit code for the error.
    pub fn exit_code(self) -> i32 {
        match self {
            ExitError::Generic => 1,
            ExitError::Invalid => 2,
        }
    }
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        error!("Fatal error. Exiting.");
        ExitError::Generic
    }
}
