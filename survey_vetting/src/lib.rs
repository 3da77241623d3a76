//! Per-path voting and value submission for locale data vetting.
//!
//! A user's action on one data row (one base path in one locale) is read by the
//! [`ChoiceInterpreter`], checked against the user's rights and the correctness
//! checks, then applied to a [`DataSource`] by the [`RowProcessor`]. Every decision
//! is reported through a [`ResultHandler`].
//!
//! See the [manual] for the form fields and the batch formats.

mod config;
mod error;
mod interpret;
mod ledger;
mod memory;
mod processor;
mod registry;
mod state;
mod validate;
mod worker;

pub mod builder;
pub mod handler;
pub mod manual;
pub mod xpath;

pub use crate::config::*;
pub use crate::error::{VettingError, VettingResult};
pub use crate::handler::{HtmlResultHandler, JsonResultHandler, NullResultHandler, ResultHandler, SubmissionEvent};
pub use crate::interpret::{ChoiceInterpreter, Intent};
pub use crate::ledger::{DataSource, StoredValue, ValueStore, VoteLedger, VoteRecord};
pub use crate::memory::MemoryDb;
pub use crate::processor::RowProcessor;
pub use crate::registry::{User, UserLevel, UserRegistry};
pub use crate::state::{RecountReport, SurveyState};
pub use crate::validate::{
    CharacterCheck, CheckSet, Checker, CoverageCheck, LengthCheck, SubmissionValidator, Validation,
    WhitespaceCheck,
};
pub use crate::worker::BackgroundQueue;
