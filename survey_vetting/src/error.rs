use snafu::Snafu;

use crate::config::{Locale, PathId, UserId};

/// Errors that prevent a request from completing.
///
/// Expected outcomes (denied permissions, rejected values, unknown choices)
/// are never errors: they are reported through the result handler.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VettingError {
    #[snafu(display("Unknown path id {id}"))]
    UnknownPath { id: PathId },

    #[snafu(display("Unknown user {id}"))]
    UnknownUser { id: UserId },

    #[snafu(display("Lock poisoned: {what}"))]
    LockPoisoned { what: String },

    #[snafu(display("Could not start the background worker"))]
    WorkerSpawn { source: std::io::Error },

    #[snafu(display("The background worker has stopped"))]
    WorkerStopped {},

    #[snafu(display("Internal error: can't update {locale}:{base} - {reason}"))]
    Resolution {
        locale: Locale,
        base: PathId,
        reason: String,
    },
}

pub type VettingResult<T> = Result<T, VettingError>;
