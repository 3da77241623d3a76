// ********* Identifiers ***********

use std::collections::BTreeSet;
use std::fmt::Display;

use log::warn;
use regex::Regex;
use serde::Serialize;

/// A locale identifier such as `en` or `fr_CA`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize)]
pub struct Locale(String);

impl Locale {
    pub const ROOT: &'static str = "root";

    pub fn new(id: &str) -> Locale {
        Locale(id.to_string())
    }

    pub fn root() -> Locale {
        Locale::new(Locale::ROOT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == Locale::ROOT
    }

    /// The locale this one inherits from: `fr_CA -> fr -> root`.
    /// The root locale has no parent.
    pub fn parent(&self) -> Option<Locale> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('_') {
            Some(idx) => Some(Locale::new(&self.0[..idx])),
            None => Some(Locale::root()),
        }
    }

    /// True if `other` is this locale or one of its sublocales.
    pub fn covers(&self, other: &Locale) -> bool {
        let mut cur = Some(other.clone());
        while let Some(l) = cur {
            if l == *self {
                return true;
            }
            cur = l.parent();
        }
        false
    }
}

impl Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interned identifier of a full or base xpath.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub struct PathId(pub u32);

impl Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub struct UserId(pub u32);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

// ********* Votes ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteKind {
    /// Cast by the user from a form.
    Explicit,
    /// Inferred by the ledger from the user's own submissions.
    Implied,
    /// Forced by an administrator.
    Admin,
}

/// Which locales a bulk ledger operation covers.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocaleScope {
    All,
    Locale(Locale),
}

impl LocaleScope {
    pub fn includes(&self, locale: &Locale) -> bool {
        match self {
            LocaleScope::All => true,
            LocaleScope::Locale(l) => l == locale,
        }
    }
}

/// Outcome category of a resolved base path.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultStatus {
    /// Something was proposed, nobody voted.
    NoVotes,
    /// Votes exist but none reached quorum.
    Insufficient,
    Disputed,
    /// An administrator's vote decided the item.
    Admin,
    Good,
    Unanimous,
    /// Existing data, nobody voted, nothing proposed.
    NoChange,
    /// The winning vote is for removing the item.
    Removal,
}

impl ResultStatus {
    /// Statuses for which the item has no accepted value.
    pub fn is_bad(&self) -> bool {
        matches!(
            self,
            ResultStatus::NoVotes | ResultStatus::Insufficient | ResultStatus::Disputed
        )
    }
}

// ********* Rows ***********

/// One proposed or current value for a base path.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateItem {
    /// The full path holding this value (the base path for baseline and inherited items).
    pub path_id: PathId,
    pub xpath: String,
    pub value: String,
    /// Token used to pick this item in a form: the proposed alt tag,
    /// `current` for the baseline, `inherited-value` for inherited items.
    pub tag: String,
    pub submitter: Option<UserId>,
    pub reference: Option<String>,
    /// The locale the value was resolved from, if not this one.
    pub inherit_from: Option<Locale>,
    pub is_fallback: bool,
    pub is_aliased: bool,
    /// This item is the current winner.
    pub is_current: bool,
    pub votes: BTreeSet<UserId>,
}

impl CandidateItem {
    pub const CURRENT_TAG: &'static str = "current";
    pub const INHERITED_TAG: &'static str = "inherited-value";

    /// A value physically stored at this path in this locale.
    pub fn is_literal(&self) -> bool {
        self.inherit_from.is_none() && !self.is_fallback && !self.is_aliased
    }
}

/// All the candidate items sharing one base path, as shown on one page view.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DataRow {
    pub locale: Locale,
    pub base_xpath: String,
    pub base_path_id: PathId,
    pub items: Vec<CandidateItem>,
    pub winning_path: Option<PathId>,
}

impl DataRow {
    pub fn item_by_tag(&self, tag: &str) -> Option<&CandidateItem> {
        self.items.iter().find(|it| it.tag == tag)
    }

    pub fn item_by_path(&self, path: PathId) -> Option<&CandidateItem> {
        self.items.iter().find(|it| it.path_id == path)
    }

    /// The literal item at the base path, or the inherited item standing in for it.
    pub fn baseline_item(&self) -> Option<&CandidateItem> {
        self.items
            .iter()
            .find(|it| it.is_literal() && it.path_id == self.base_path_id)
            .or_else(|| self.items.iter().find(|it| !it.is_literal()))
    }

    /// A literal item already carrying this value.
    pub fn literal_with_value(&self, value: &str) -> Option<&CandidateItem> {
        self.items
            .iter()
            .find(|it| it.is_literal() && it.value == value)
    }
}

// ********* Requests ***********

/// The posted choice for one row.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Choice {
    NoAction,
    /// Vote for the baseline value.
    Confirm,
    /// Retract the user's vote.
    Abstain,
    /// Submit the posted value.
    ChangeTo,
    /// Vote for the item with this tag.
    Item(String),
}

impl Choice {
    pub const CONFIRM: &'static str = "confirm";
    pub const ABSTAIN: &'static str = "abstain";
    pub const CHANGE_TO: &'static str = "change to";
    pub const NO_CHANGE: &'static str = "nochange";

    pub fn parse(token: &str) -> Choice {
        match token {
            "" | Choice::NO_CHANGE => Choice::NoAction,
            Choice::CONFIRM => Choice::Confirm,
            Choice::ABSTAIN => Choice::Abstain,
            Choice::CHANGE_TO => Choice::ChangeTo,
            tag => Choice::Item(tag.to_string()),
        }
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::NoAction => write!(f, ""),
            Choice::Confirm => write!(f, "{}", Choice::CONFIRM),
            Choice::Abstain => write!(f, "{}", Choice::ABSTAIN),
            Choice::ChangeTo => write!(f, "{}", Choice::CHANGE_TO),
            Choice::Item(tag) => write!(f, "{}", tag),
        }
    }
}

/// The form fields posted for one row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RowRequest {
    pub choice: Choice,
    pub value: String,
    pub reference: Option<String>,
    pub delete_tags: BTreeSet<String>,
    pub unvote_tags: BTreeSet<String>,
}

impl RowRequest {
    pub fn new(choice: Choice) -> RowRequest {
        RowRequest {
            choice,
            value: String::new(),
            reference: None,
            delete_tags: BTreeSet::new(),
            unvote_tags: BTreeSet::new(),
        }
    }

    pub fn change_to(value: &str, reference: Option<&str>) -> RowRequest {
        RowRequest {
            value: value.to_string(),
            reference: reference.map(|r| r.to_string()),
            ..RowRequest::new(Choice::ChangeTo)
        }
    }
}

// ******** Output data structures *********

/// The action a user was refused.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum Action {
    Vote,
    Submit,
    Remove,
    ModifyAlias,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Vote => "vote",
            Action::Submit => "submit",
            Action::Remove => "remove",
            Action::ModifyAlias => "modify an alias",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RejectReason {
    EmptyValue,
    /// The value failed these checks and the handler refused it.
    CheckErrors(Vec<CheckStatus>),
}

/// Outcome of one decision taken while processing a row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SubmissionResult {
    VoteAccepted,
    VoteRemoved,
    ValueAdded,
    ValueRejected(RejectReason),
    ItemRemoved,
    PermissionDenied(Action),
    UnknownChoice,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RowOutcome {
    pub results: Vec<SubmissionResult>,
}

impl RowOutcome {
    /// True if something was written to the ledger or the store.
    pub fn changed(&self) -> bool {
        self.results.iter().any(|r| {
            matches!(
                r,
                SubmissionResult::VoteAccepted
                    | SubmissionResult::VoteRemoved
                    | SubmissionResult::ValueAdded
                    | SubmissionResult::ItemRemoved
            )
        })
    }
}

// ********* Checks **********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Error,
    Warning,
    Comment,
}

/// One finding of a correctness check.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CheckStatus {
    pub kind: StatusKind,
    /// Name of the check that produced this status.
    pub cause: String,
    pub subtype: String,
    pub message: String,
}

impl CheckStatus {
    pub fn error(cause: &str, subtype: &str, message: &str) -> CheckStatus {
        CheckStatus {
            kind: StatusKind::Error,
            cause: cause.to_string(),
            subtype: subtype.to_string(),
            message: message.to_string(),
        }
    }

    pub fn warning(cause: &str, subtype: &str, message: &str) -> CheckStatus {
        CheckStatus {
            kind: StatusKind::Warning,
            ..CheckStatus::error(cause, subtype, message)
        }
    }
}

// ********* Configuration **********

#[derive(Debug, Clone)]
pub struct SubmissionRules {
    /// Paths on which an empty value may be submitted.
    pub empty_allowed: Vec<Regex>,
    /// Causes whose error statuses never block a submission.
    pub advisory_causes: Vec<String>,
    /// No votes or submissions are accepted while set.
    pub readonly: bool,
}

impl SubmissionRules {
    pub const DEFAULT_EMPTY_ALLOWED: &'static str = "^//ldml/fallback";
    pub const COVERAGE_CAUSE: &'static str = "CheckCoverage";

    pub fn allows_empty(&self, xpath: &str) -> bool {
        self.empty_allowed.iter().any(|re| re.is_match(xpath))
    }

    pub fn is_advisory(&self, status: &CheckStatus) -> bool {
        self.advisory_causes.iter().any(|c| *c == status.cause)
    }
}

impl Default for SubmissionRules {
    fn default() -> Self {
        let empty_allowed = match Regex::new(SubmissionRules::DEFAULT_EMPTY_ALLOWED) {
            Ok(re) => vec![re],
            Err(e) => {
                // Empty values are then refused everywhere.
                warn!("SubmissionRules: invalid default pattern: {}", e);
                Vec::new()
            }
        };
        SubmissionRules {
            empty_allowed,
            advisory_causes: vec![SubmissionRules::COVERAGE_CAUSE.to_string()],
            readonly: false,
        }
    }
}
