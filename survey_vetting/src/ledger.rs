//! The collaborators the vetting core writes to: the vote ledger and the value store.
//!
//! Every call is expected to be atomic. Failures are returned as errors and
//! abort the request.

use crate::config::*;
use crate::error::VettingResult;

/// A value stored at one full path of one locale.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StoredValue {
    pub xpath: String,
    pub base: PathId,
    pub value: String,
    pub submitter: Option<UserId>,
    pub reference: Option<String>,
}

/// A vote as recorded by the ledger.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct VoteRecord {
    pub voter: UserId,
    pub target: PathId,
    pub kind: VoteKind,
}

pub trait VoteLedger {
    /// The path the user currently votes for on this base path.
    fn query_vote(
        &self,
        locale: &Locale,
        user: UserId,
        base: PathId,
    ) -> VettingResult<Option<PathId>>;

    /// Casts or replaces the user's vote.
    fn vote(
        &mut self,
        locale: &Locale,
        base: PathId,
        user: UserId,
        target: PathId,
        kind: VoteKind,
    ) -> VettingResult<()>;

    /// Removes the user's vote. Returns the number of votes removed.
    fn unvote(&mut self, locale: &Locale, base: PathId, user: UserId) -> VettingResult<usize>;

    /// All the votes cast on a base path.
    fn voters(&self, locale: &Locale, base: PathId) -> VettingResult<Vec<VoteRecord>>;

    /// Recomputes the winners. Returns the number of results updated.
    fn update_results(&mut self, scope: &LocaleScope) -> VettingResult<usize>;

    /// Adds the votes implied by users' own submissions. Returns the number added.
    fn update_implied_votes(&mut self, scope: &LocaleScope) -> VettingResult<usize>;

    fn winning_path(&self, locale: &Locale, base: PathId) -> VettingResult<Option<PathId>>;

    fn result_status(&self, locale: &Locale, base: PathId) -> VettingResult<Option<ResultStatus>>;
}

pub trait ValueStore {
    /// The id of a path, allocating one if the path was never seen.
    fn intern_path(&mut self, xpath: &str) -> VettingResult<PathId>;

    fn path_id(&self, xpath: &str) -> VettingResult<Option<PathId>>;

    fn xpath_for(&self, id: PathId) -> VettingResult<String>;

    /// Stores a value. Returns the id of its full path.
    fn put_value(
        &mut self,
        locale: &Locale,
        xpath: &str,
        value: &str,
        submitter: Option<UserId>,
        reference: Option<&str>,
    ) -> VettingResult<PathId>;

    /// Returns true if a value was removed.
    fn remove_value(&mut self, locale: &Locale, xpath: &str) -> VettingResult<bool>;

    fn has_value(&self, locale: &Locale, xpath: &str) -> VettingResult<bool>;

    fn value_at(&self, locale: &Locale, xpath: &str) -> VettingResult<Option<StoredValue>>;

    /// Every value of this locale under the base path, in path id order.
    fn items_for_base(
        &self,
        locale: &Locale,
        base: PathId,
    ) -> VettingResult<Vec<(PathId, StoredValue)>>;

    fn locales(&self) -> VettingResult<Vec<Locale>>;
}

/// A backend holding both the ledger and the values, as a single database does.
pub trait DataSource: VoteLedger + ValueStore {}

impl<T: VoteLedger + ValueStore> DataSource for T {}
