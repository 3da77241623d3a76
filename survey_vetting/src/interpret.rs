use log::{debug, warn};
use std::collections::BTreeSet;

use crate::config::*;

/// What the posted fields of a row ask for, before any permission check.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Intent {
    NoOp,
    VoteForItem(CandidateItem),
    ConfirmBaseline(CandidateItem),
    SubmitNewValue {
        value: String,
        reference: Option<String>,
        /// The value is empty and the path does not accept empty values.
        empty_disallowed: bool,
    },
    Abstain,
    DeleteItems(Vec<CandidateItem>),
    AdminUnvoteItems(Vec<CandidateItem>),
    UnknownChoice(String),
}

impl Intent {
    fn voted_item(&self) -> Option<&CandidateItem> {
        match self {
            Intent::VoteForItem(it) | Intent::ConfirmBaseline(it) => Some(it),
            _ => None,
        }
    }
}

pub struct ChoiceInterpreter<'a> {
    rules: &'a SubmissionRules,
}

impl<'a> ChoiceInterpreter<'a> {
    pub fn new(rules: &'a SubmissionRules) -> ChoiceInterpreter<'a> {
        ChoiceInterpreter { rules }
    }

    /// The intents of a request, in the order they must be applied:
    /// deletions, then administrative unvotes, then the choice itself.
    pub fn interpret(&self, request: &RowRequest, row: &DataRow) -> Vec<Intent> {
        let mut res = Vec::new();

        let deleted = matching_items(row, &request.delete_tags, "delete");
        if !deleted.is_empty() {
            res.push(Intent::DeleteItems(deleted.clone()));
        }
        let unvoted = matching_items(row, &request.unvote_tags, "unvote");
        if !unvoted.is_empty() {
            res.push(Intent::AdminUnvoteItems(unvoted));
        }

        if let Some(primary) = self.primary_intent(request, row) {
            let is_deleted = primary
                .voted_item()
                .map(|it| deleted.iter().any(|d| d.path_id == it.path_id))
                .unwrap_or(false);
            if is_deleted {
                debug!(
                    "interpret: {}:{} vote for a deleted item turned into abstain",
                    row.locale, row.base_xpath
                );
                res.push(Intent::Abstain);
            } else {
                res.push(primary);
            }
        }

        if res.is_empty() {
            res.push(Intent::NoOp);
        }
        debug!(
            "interpret: {}:{} choice {:?} -> {:?}",
            row.locale, row.base_xpath, request.choice, res
        );
        res
    }

    fn primary_intent(&self, request: &RowRequest, row: &DataRow) -> Option<Intent> {
        match &request.choice {
            Choice::NoAction => None,
            Choice::Abstain => Some(Intent::Abstain),
            Choice::Confirm => match row.baseline_item() {
                Some(it) => Some(vote_or_rewrite(it, true)),
                None => Some(Intent::UnknownChoice(Choice::CONFIRM.to_string())),
            },
            Choice::ChangeTo => Some(Intent::SubmitNewValue {
                value: request.value.clone(),
                reference: request.reference.clone(),
                empty_disallowed: request.value.is_empty()
                    && !self.rules.allows_empty(&row.base_xpath),
            }),
            Choice::Item(tag) => match row.item_by_tag(tag) {
                Some(it) => Some(vote_or_rewrite(it, false)),
                None => Some(Intent::UnknownChoice(tag.clone())),
            },
        }
    }
}

// Votes only go to values stored in this locale. Picking an inherited or
// aliased value copies it in as a new submission.
fn vote_or_rewrite(item: &CandidateItem, confirm: bool) -> Intent {
    if !item.is_literal() {
        return Intent::SubmitNewValue {
            value: item.value.clone(),
            reference: item.reference.clone(),
            empty_disallowed: false,
        };
    }
    if confirm {
        Intent::ConfirmBaseline(item.clone())
    } else {
        Intent::VoteForItem(item.clone())
    }
}

fn matching_items(row: &DataRow, tags: &BTreeSet<String>, what: &str) -> Vec<CandidateItem> {
    let mut res = Vec::new();
    for tag in tags {
        match row.item_by_tag(tag) {
            Some(it) => res.push(it.clone()),
            None => warn!(
                "interpret: {}:{} ignoring {} of unknown item {:?}",
                row.locale, row.base_xpath, what, tag
            ),
        }
    }
    res
}
