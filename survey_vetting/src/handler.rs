//! Callbacks through which the outcome of a submission is reported.

use log::debug;
use serde::Serialize;

use crate::config::*;

/// Receives every decision taken while a row is processed.
///
/// Calls happen on the thread processing the request, while the data source is
/// locked. Implementations must not call back into the data source.
pub trait ResultHandler {
    /// Number of results updated after a section was processed.
    fn handle_result_count(&mut self, count: usize);

    fn handle_remove_item(&mut self, row: &DataRow, item: &CandidateItem, vote_removed: bool);

    fn handle_no_permission(&mut self, row: &DataRow, item: Option<&CandidateItem>, action: Action);

    /// An administrator removed the vote of `voter`.
    fn handle_remove_vote(&mut self, row: &DataRow, voter: UserId, item: &CandidateItem);

    fn handle_empty_changeto(&mut self, row: &DataRow, item: Option<&CandidateItem>);

    /// The posted value already exists and the user already votes for it.
    fn warn_already_voting_for(&mut self, row: &DataRow, item: &CandidateItem);

    /// The posted value already exists and was turned into a vote for it.
    fn warn_accepted_as_vote_for(&mut self, row: &DataRow, item: &CandidateItem);

    fn handle_new_value(&mut self, row: &DataRow, value: &str, had_errors: bool);

    /// One status returned by the checks for a posted value.
    fn handle_error(&mut self, row: &DataRow, status: &CheckStatus, value: &str);

    /// The user's vote moved from `old` to `new`. `None` means no vote.
    fn handle_vote(&mut self, row: &DataRow, old: Option<PathId>, new: Option<PathId>);

    fn handle_unknown_choice(&mut self, row: &DataRow, choice: &str);

    /// Asked once when a posted value has errors. True refuses the value.
    fn reject_error_item(&mut self, row: &DataRow) -> bool;

    /// A rejected value, so that it can be shown again to the user.
    fn handle_proposed_value(&mut self, _row: &DataRow, _value: &str) {}
}

/// Ignores everything and refuses values with errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResultHandler;

impl ResultHandler for NullResultHandler {
    fn handle_result_count(&mut self, _count: usize) {}
    fn handle_remove_item(&mut self, _row: &DataRow, _item: &CandidateItem, _vote_removed: bool) {}
    fn handle_no_permission(&mut self, _row: &DataRow, _item: Option<&CandidateItem>, _action: Action) {}
    fn handle_remove_vote(&mut self, _row: &DataRow, _voter: UserId, _item: &CandidateItem) {}
    fn handle_empty_changeto(&mut self, _row: &DataRow, _item: Option<&CandidateItem>) {}
    fn warn_already_voting_for(&mut self, _row: &DataRow, _item: &CandidateItem) {}
    fn warn_accepted_as_vote_for(&mut self, _row: &DataRow, _item: &CandidateItem) {}
    fn handle_new_value(&mut self, _row: &DataRow, _value: &str, _had_errors: bool) {}
    fn handle_error(&mut self, _row: &DataRow, _status: &CheckStatus, _value: &str) {}
    fn handle_vote(&mut self, _row: &DataRow, _old: Option<PathId>, _new: Option<PathId>) {}
    fn handle_unknown_choice(&mut self, _row: &DataRow, _choice: &str) {}
    fn reject_error_item(&mut self, _row: &DataRow) -> bool {
        true
    }
}

// ********* Recorded events ***********

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SubmissionEvent {
    ResultCount {
        count: usize,
    },
    RemoveItem {
        tag: String,
        value: String,
        #[serde(rename = "voteRemoved")]
        vote_removed: bool,
    },
    NoPermission {
        tag: Option<String>,
        action: String,
    },
    RemoveVote {
        voter: UserId,
        tag: String,
    },
    EmptyChangeTo,
    AlreadyVotingFor {
        tag: String,
    },
    AcceptedAsVoteFor {
        tag: String,
    },
    NewValue {
        value: String,
        #[serde(rename = "hadErrors")]
        had_errors: bool,
    },
    Error {
        kind: StatusKind,
        cause: String,
        subtype: String,
        message: String,
        value: String,
    },
    Vote {
        old: Option<PathId>,
        new: Option<PathId>,
    },
    UnknownChoice {
        choice: String,
    },
    ProposedValue {
        value: String,
    },
}

/// Records the callbacks as serializable events.
#[derive(Debug, Clone)]
pub struct JsonResultHandler {
    events: Vec<SubmissionEvent>,
    reject_errors: bool,
}

impl Default for JsonResultHandler {
    fn default() -> Self {
        JsonResultHandler::new()
    }
}

impl JsonResultHandler {
    pub fn new() -> JsonResultHandler {
        JsonResultHandler {
            events: Vec::new(),
            reject_errors: true,
        }
    }

    /// Accept values with errors instead of refusing them.
    pub fn accepting_errors(mut self) -> JsonResultHandler {
        self.reject_errors = false;
        self
    }

    pub fn events(&self) -> &[SubmissionEvent] {
        &self.events
    }

    /// Returns the recorded events and starts a new record.
    pub fn take_events(&mut self) -> Vec<SubmissionEvent> {
        std::mem::take(&mut self.events)
    }

    fn push(&mut self, event: SubmissionEvent) {
        debug!("event: {:?}", event);
        self.events.push(event);
    }
}

impl ResultHandler for JsonResultHandler {
    fn handle_result_count(&mut self, count: usize) {
        self.push(SubmissionEvent::ResultCount { count });
    }

    fn handle_remove_item(&mut self, _row: &DataRow, item: &CandidateItem, vote_removed: bool) {
        self.push(SubmissionEvent::RemoveItem {
            tag: item.tag.clone(),
            value: item.value.clone(),
            vote_removed,
        });
    }

    fn handle_no_permission(&mut self, _row: &DataRow, item: Option<&CandidateItem>, action: Action) {
        self.push(SubmissionEvent::NoPermission {
            tag: item.map(|it| it.tag.clone()),
            action: action.to_string(),
        });
    }

    fn handle_remove_vote(&mut self, _row: &DataRow, voter: UserId, item: &CandidateItem) {
        self.push(SubmissionEvent::RemoveVote {
            voter,
            tag: item.tag.clone(),
        });
    }

    fn handle_empty_changeto(&mut self, _row: &DataRow, _item: Option<&CandidateItem>) {
        self.push(SubmissionEvent::EmptyChangeTo);
    }

    fn warn_already_voting_for(&mut self, _row: &DataRow, item: &CandidateItem) {
        self.push(SubmissionEvent::AlreadyVotingFor {
            tag: item.tag.clone(),
        });
    }

    fn warn_accepted_as_vote_for(&mut self, _row: &DataRow, item: &CandidateItem) {
        self.push(SubmissionEvent::AcceptedAsVoteFor {
            tag: item.tag.clone(),
        });
    }

    fn handle_new_value(&mut self, _row: &DataRow, value: &str, had_errors: bool) {
        self.push(SubmissionEvent::NewValue {
            value: value.to_string(),
            had_errors,
        });
    }

    fn handle_error(&mut self, _row: &DataRow, status: &CheckStatus, value: &str) {
        self.push(SubmissionEvent::Error {
            kind: status.kind,
            cause: status.cause.clone(),
            subtype: status.subtype.clone(),
            message: status.message.clone(),
            value: value.to_string(),
        });
    }

    fn handle_vote(&mut self, _row: &DataRow, old: Option<PathId>, new: Option<PathId>) {
        self.push(SubmissionEvent::Vote { old, new });
    }

    fn handle_unknown_choice(&mut self, _row: &DataRow, choice: &str) {
        self.push(SubmissionEvent::UnknownChoice {
            choice: choice.to_string(),
        });
    }

    fn reject_error_item(&mut self, _row: &DataRow) -> bool {
        self.reject_errors
    }

    fn handle_proposed_value(&mut self, _row: &DataRow, value: &str) {
        self.push(SubmissionEvent::ProposedValue {
            value: value.to_string(),
        });
    }
}

// ********* HTML ***********

fn escape(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => res.push_str("&amp;"),
            '<' => res.push_str("&lt;"),
            '>' => res.push_str("&gt;"),
            '"' => res.push_str("&quot;"),
            '\'' => res.push_str("&#39;"),
            _ => res.push(c),
        }
    }
    res
}

/// Writes one HTML fragment per callback, for the interactive front end.
#[derive(Debug, Clone, Default)]
pub struct HtmlResultHandler {
    html: String,
}

impl HtmlResultHandler {
    pub fn new() -> HtmlResultHandler {
        HtmlResultHandler::default()
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    fn line(&mut self, class: &str, row: &DataRow, text: &str) {
        self.html.push_str(&format!(
            "<div class=\"{}\" title=\"{}\">{}</div>\n",
            class,
            escape(&format!("{}:{}", row.locale, row.base_xpath)),
            text
        ));
    }
}

impl ResultHandler for HtmlResultHandler {
    fn handle_result_count(&mut self, count: usize) {
        self.html
            .push_str(&format!("<div class=\"resultCount\">{} results updated</div>\n", count));
    }

    fn handle_remove_item(&mut self, row: &DataRow, item: &CandidateItem, vote_removed: bool) {
        let mut text = format!("Removed item <b>{}</b>", escape(&item.value));
        if vote_removed {
            text.push_str(" and your vote for it");
        }
        self.line("removeItem", row, &text);
    }

    fn handle_no_permission(&mut self, row: &DataRow, item: Option<&CandidateItem>, action: Action) {
        let text = match item {
            Some(it) => format!(
                "You do not have permission to {} the item <b>{}</b>",
                action,
                escape(&it.value)
            ),
            None => format!("You do not have permission to {} this item", action),
        };
        self.line("noPermission", row, &text);
    }

    fn handle_remove_vote(&mut self, row: &DataRow, voter: UserId, item: &CandidateItem) {
        let text = format!(
            "Removed vote of user {} for <b>{}</b>",
            voter,
            escape(&item.value)
        );
        self.line("removeVote", row, &text);
    }

    fn handle_empty_changeto(&mut self, row: &DataRow, _item: Option<&CandidateItem>) {
        self.line("emptyChangeTo", row, "Empty value not accepted");
    }

    fn warn_already_voting_for(&mut self, row: &DataRow, item: &CandidateItem) {
        let text = format!("You are already voting for <b>{}</b>", escape(&item.value));
        self.line("alreadyVoting", row, &text);
    }

    fn warn_accepted_as_vote_for(&mut self, row: &DataRow, item: &CandidateItem) {
        let text = format!(
            "The value already exists, accepted as a vote for <b>{}</b>",
            escape(&item.value)
        );
        self.line("acceptedAsVote", row, &text);
    }

    fn handle_new_value(&mut self, row: &DataRow, value: &str, had_errors: bool) {
        let mut text = format!("Added value <b>{}</b>", escape(value));
        if had_errors {
            text.push_str(" (with errors)");
        }
        self.line("newValue", row, &text);
    }

    fn handle_error(&mut self, row: &DataRow, status: &CheckStatus, value: &str) {
        let text = format!(
            "{:?} {}: {} in <b>{}</b>",
            status.kind,
            escape(&status.cause),
            escape(&status.message),
            escape(value)
        );
        self.line("checkStatus", row, &text);
    }

    fn handle_vote(&mut self, row: &DataRow, old: Option<PathId>, new: Option<PathId>) {
        let text = match (old, new) {
            (_, Some(n)) => match row.item_by_path(n) {
                Some(it) => format!("Vote accepted for <b>{}</b>", escape(&it.value)),
                None => "Vote accepted".to_string(),
            },
            (Some(_), None) => "Vote removed".to_string(),
            (None, None) => "No vote".to_string(),
        };
        self.line("vote", row, &text);
    }

    fn handle_unknown_choice(&mut self, row: &DataRow, choice: &str) {
        let text = format!("Unknown choice <b>{}</b>", escape(choice));
        self.line("unknownChoice", row, &text);
    }

    fn reject_error_item(&mut self, _row: &DataRow) -> bool {
        true
    }

    fn handle_proposed_value(&mut self, row: &DataRow, value: &str) {
        let text = format!(
            "<input type=\"text\" value=\"{}\"/>",
            escape(value)
        );
        self.line("proposedValue", row, &text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> DataRow {
        DataRow {
            locale: Locale::new("fr"),
            base_xpath: "//ldml/x".to_string(),
            base_path_id: PathId(1),
            items: vec![],
            winning_path: None,
        }
    }

    #[test]
    fn json_events_serialize_with_tags() {
        let mut h = JsonResultHandler::new();
        h.handle_vote(&row(), None, Some(PathId(2)));
        h.handle_new_value(&row(), "x", false);
        h.handle_empty_changeto(&row(), None);
        let s = serde_json::to_string(h.events()).unwrap();
        assert_eq!(
            s,
            r#"[{"event":"vote","old":null,"new":2},{"event":"newValue","value":"x","hadErrors":false},{"event":"emptyChangeTo"}]"#
        );
        assert!(h.reject_error_item(&row()));
        assert!(!JsonResultHandler::new()
            .accepting_errors()
            .reject_error_item(&row()));
    }

    #[test]
    fn html_is_escaped() {
        let mut h = HtmlResultHandler::new();
        h.handle_new_value(&row(), "<b>&", true);
        assert_eq!(
            h.as_str(),
            "<div class=\"newValue\" title=\"fr://ldml/x\">Added value <b>&lt;b&gt;&amp;</b> (with errors)</div>\n"
        );
    }
}
