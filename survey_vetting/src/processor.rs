use log::{debug, info, warn};
use std::collections::BTreeSet;

use crate::config::*;
use crate::error::VettingResult;
use crate::handler::ResultHandler;
use crate::interpret::{ChoiceInterpreter, Intent};
use crate::ledger::DataSource;
use crate::registry::User;
use crate::validate::{Checker, SubmissionValidator, Validation};
use crate::xpath;

/// Applies the requests of one user to the data source.
///
/// The caller holds the data source for the lifetime of the processor, so every
/// read-decide-write sequence below is atomic with respect to other requests.
pub struct RowProcessor<'a> {
    source: &'a mut dyn DataSource,
    checker: &'a dyn Checker,
    rules: &'a SubmissionRules,
    user: &'a User,
}

impl<'a> RowProcessor<'a> {
    pub fn new(
        source: &'a mut dyn DataSource,
        checker: &'a dyn Checker,
        rules: &'a SubmissionRules,
        user: &'a User,
    ) -> RowProcessor<'a> {
        RowProcessor {
            source,
            checker,
            rules,
            user,
        }
    }

    /// Processes one row. Returns true if something changed.
    pub fn process_data_row_changes(
        &mut self,
        request: &RowRequest,
        row: &DataRow,
        handler: &mut dyn ResultHandler,
    ) -> VettingResult<bool> {
        Ok(self.process_row(request, row, handler)?.changed())
    }

    pub fn process_row(
        &mut self,
        request: &RowRequest,
        row: &DataRow,
        handler: &mut dyn ResultHandler,
    ) -> VettingResult<RowOutcome> {
        let intents = ChoiceInterpreter::new(self.rules).interpret(request, row);
        let mut outcome = RowOutcome::default();
        for intent in intents {
            self.apply(intent, row, handler, &mut outcome)?;
        }
        if outcome.changed() {
            self.source
                .update_implied_votes(&LocaleScope::Locale(row.locale.clone()))?;
        }
        debug!(
            "process_row: {} {}:{} -> {:?}",
            self.user.id, row.locale, row.base_xpath, outcome.results
        );
        Ok(outcome)
    }

    /// Processes all the rows of a page, then updates the results of the changed
    /// locales at once.
    pub fn process_section_changes(
        &mut self,
        rows: &[(RowRequest, DataRow)],
        handler: &mut dyn ResultHandler,
    ) -> VettingResult<bool> {
        let mut changed: BTreeSet<Locale> = BTreeSet::new();
        for (request, row) in rows {
            if self.process_data_row_changes(request, row, handler)? {
                changed.insert(row.locale.clone());
            }
        }
        if changed.is_empty() {
            return Ok(false);
        }
        let mut count = 0;
        for locale in changed {
            count += self.source.update_results(&LocaleScope::Locale(locale))?;
        }
        info!(
            "process_section_changes: {} rows, {} results updated",
            rows.len(),
            count
        );
        handler.handle_result_count(count);
        Ok(true)
    }

    fn apply(
        &mut self,
        intent: Intent,
        row: &DataRow,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        match intent {
            Intent::NoOp => {}
            Intent::VoteForItem(item) | Intent::ConfirmBaseline(item) => {
                self.vote_for(row, &item, handler, outcome)?
            }
            Intent::Abstain => self.abstain(row, handler, outcome)?,
            Intent::SubmitNewValue {
                value,
                reference,
                empty_disallowed,
            } => self.submit_value(
                row,
                &value,
                reference.as_deref(),
                empty_disallowed,
                handler,
                outcome,
            )?,
            Intent::DeleteItems(items) => {
                for item in items.iter() {
                    self.delete_item(row, item, handler, outcome)?;
                }
            }
            Intent::AdminUnvoteItems(items) => {
                for item in items.iter() {
                    self.admin_unvote(row, item, handler, outcome)?;
                }
            }
            Intent::UnknownChoice(token) => {
                handler.handle_unknown_choice(row, &token);
                outcome.results.push(SubmissionResult::UnknownChoice);
            }
        }
        Ok(())
    }

    fn can_modify(&self, locale: &Locale) -> bool {
        !self.rules.readonly && self.user.can_modify_locale(locale)
    }

    fn deny(
        &self,
        row: &DataRow,
        item: Option<&CandidateItem>,
        action: Action,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) {
        info!(
            "deny: {} may not {} on {}:{}",
            self.user.id, action, row.locale, row.base_xpath
        );
        handler.handle_no_permission(row, item, action);
        outcome.results.push(SubmissionResult::PermissionDenied(action));
    }

    fn current_vote(&self, row: &DataRow) -> VettingResult<Option<PathId>> {
        self.source
            .query_vote(&row.locale, self.user.id, row.base_path_id)
    }

    fn cast_vote(
        &mut self,
        row: &DataRow,
        old: Option<PathId>,
        target: PathId,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        let kind = if self.user.is_admin() {
            VoteKind::Admin
        } else {
            VoteKind::Explicit
        };
        self.source
            .vote(&row.locale, row.base_path_id, self.user.id, target, kind)?;
        handler.handle_vote(row, old, Some(target));
        outcome.results.push(SubmissionResult::VoteAccepted);
        Ok(())
    }

    fn vote_for(
        &mut self,
        row: &DataRow,
        item: &CandidateItem,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        if !self.can_modify(&row.locale) {
            self.deny(row, Some(item), Action::Vote, handler, outcome);
            return Ok(());
        }
        let old = self.current_vote(row)?;
        if old == Some(item.path_id) {
            debug!(
                "vote_for: {} already votes for {}",
                self.user.id, item.path_id
            );
            return Ok(());
        }
        self.cast_vote(row, old, item.path_id, handler, outcome)
    }

    fn abstain(
        &mut self,
        row: &DataRow,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        if !self.can_modify(&row.locale) {
            self.deny(row, None, Action::Vote, handler, outcome);
            return Ok(());
        }
        if let Some(old) = self.current_vote(row)? {
            self.source
                .unvote(&row.locale, row.base_path_id, self.user.id)?;
            handler.handle_vote(row, Some(old), None);
            outcome.results.push(SubmissionResult::VoteRemoved);
        }
        Ok(())
    }

    fn submit_value(
        &mut self,
        row: &DataRow,
        value: &str,
        reference: Option<&str>,
        empty_disallowed: bool,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        if empty_disallowed {
            handler.handle_empty_changeto(row, None);
            outcome
                .results
                .push(SubmissionResult::ValueRejected(RejectReason::EmptyValue));
            return Ok(());
        }
        if !self.can_modify(&row.locale) {
            self.deny(row, None, Action::Submit, handler, outcome);
            return Ok(());
        }

        if let Some(existing) = row.literal_with_value(value) {
            let old = self.current_vote(row)?;
            if old == Some(existing.path_id) {
                handler.warn_already_voting_for(row, existing);
                return Ok(());
            }
            handler.warn_accepted_as_vote_for(row, existing);
            return self.cast_vote(row, old, existing.path_id, handler, outcome);
        }

        let validator = SubmissionValidator::new(self.checker, self.rules);
        let had_errors = match validator.validate(row, &row.base_xpath, value, handler) {
            Validation::Rejected(errors) => {
                handler.handle_proposed_value(row, value);
                outcome
                    .results
                    .push(SubmissionResult::ValueRejected(RejectReason::CheckErrors(
                        errors,
                    )));
                return Ok(());
            }
            Validation::Accepted { had_errors } => had_errors,
        };

        let new_xpath = self.fresh_proposed_path(row)?;
        let id = self.source.put_value(
            &row.locale,
            &new_xpath,
            value,
            Some(self.user.id),
            reference,
        )?;
        info!(
            "submit_value: {} added {:?} at {}:{}",
            self.user.id, value, row.locale, new_xpath
        );
        handler.handle_new_value(row, value, had_errors);
        outcome.results.push(SubmissionResult::ValueAdded);

        let old = self.current_vote(row)?;
        self.cast_vote(row, old, id, handler, outcome)
    }

    // The first `proposed-u<user>-<n>` path without a value.
    fn fresh_proposed_path(&self, row: &DataRow) -> VettingResult<String> {
        let mut n = 1;
        loop {
            let candidate =
                xpath::with_proposed_alt(&row.base_xpath, &xpath::proposed_tag(self.user.id.0, n));
            if !self.source.has_value(&row.locale, &candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    fn delete_item(
        &mut self,
        row: &DataRow,
        item: &CandidateItem,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        if !item.is_literal() {
            self.deny(row, Some(item), Action::ModifyAlias, handler, outcome);
            return Ok(());
        }
        let owner = item.submitter == Some(self.user.id);
        if !self.can_modify(&row.locale) || !(owner || self.user.is_tc()) {
            self.deny(row, Some(item), Action::Remove, handler, outcome);
            return Ok(());
        }
        if item.votes.iter().any(|v| *v != self.user.id) {
            debug!(
                "delete_item: {} still has votes {:?}",
                item.tag, item.votes
            );
            self.deny(row, Some(item), Action::Remove, handler, outcome);
            return Ok(());
        }

        let mut vote_removed = false;
        if self.current_vote(row)? == Some(item.path_id) {
            self.source
                .unvote(&row.locale, row.base_path_id, self.user.id)?;
            vote_removed = true;
        }
        if self.source.remove_value(&row.locale, &item.xpath)? {
            handler.handle_remove_item(row, item, vote_removed);
            outcome.results.push(SubmissionResult::ItemRemoved);
        } else {
            warn!(
                "delete_item: {}:{} was already gone",
                row.locale, item.xpath
            );
            if vote_removed {
                handler.handle_vote(row, Some(item.path_id), None);
                outcome.results.push(SubmissionResult::VoteRemoved);
            }
        }
        Ok(())
    }

    fn admin_unvote(
        &mut self,
        row: &DataRow,
        item: &CandidateItem,
        handler: &mut dyn ResultHandler,
        outcome: &mut RowOutcome,
    ) -> VettingResult<()> {
        if !self.user.is_tc() || self.rules.readonly {
            self.deny(row, Some(item), Action::Vote, handler, outcome);
            return Ok(());
        }
        for voter in item.votes.iter() {
            let current = self
                .source
                .query_vote(&row.locale, *voter, row.base_path_id)?;
            if current != Some(item.path_id) {
                continue;
            }
            if self
                .source
                .unvote(&row.locale, row.base_path_id, *voter)?
                > 0
            {
                handler.handle_remove_vote(row, *voter, item);
                outcome.results.push(SubmissionResult::VoteRemoved);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::load_row;
    use crate::handler::{JsonResultHandler, NullResultHandler, SubmissionEvent};
    use crate::ledger::{ValueStore, VoteLedger};
    use crate::memory::MemoryDb;
    use crate::registry::{UserLevel, UserRegistry};
    use crate::validate::CheckSet;
    use std::sync::Arc;

    const DE: &str = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn user(id: u32, org: &str, level: UserLevel) -> User {
        User {
            id: UserId(id),
            email: format!("u{}@{}.example", id, org),
            org: org.to_string(),
            level,
            locales: vec![Locale::new("fr")],
        }
    }

    fn users() -> Vec<User> {
        vec![
            user(1, "acme", UserLevel::Vetter),
            user(2, "globex", UserLevel::Vetter),
            user(3, "acme", UserLevel::Street),
            user(7, "unicode", UserLevel::Tc),
            user(9, "unicode", UserLevel::Admin),
        ]
    }

    struct Fixture {
        db: MemoryDb,
        users: Vec<User>,
        rules: SubmissionRules,
        checks: CheckSet,
        fr: Locale,
    }

    impl Fixture {
        fn new() -> Fixture {
            init();
            let users = users();
            let mut db = MemoryDb::new(Arc::new(UserRegistry::new(users.clone())));
            let fr = Locale::new("fr");
            db.put_value(&fr, DE, "allemand", None, None).unwrap();
            Fixture {
                db,
                users,
                rules: SubmissionRules::default(),
                checks: CheckSet::standard(40, vec![]),
                fr,
            }
        }

        fn row(&mut self) -> DataRow {
            load_row(&mut self.db, &self.fr, DE).unwrap()
        }

        fn run(&mut self, uid: u32, request: &RowRequest, handler: &mut dyn ResultHandler) -> RowOutcome {
            let row = self.row();
            self.run_on(uid, request, &row, handler)
        }

        fn run_on(
            &mut self,
            uid: u32,
            request: &RowRequest,
            row: &DataRow,
            handler: &mut dyn ResultHandler,
        ) -> RowOutcome {
            let user = self
                .users
                .iter()
                .find(|u| u.id == UserId(uid))
                .unwrap();
            RowProcessor::new(&mut self.db, &self.checks, &self.rules, user)
                .process_row(request, row, handler)
                .unwrap()
        }

        fn vote_of(&self, uid: u32) -> Option<PathId> {
            self.db
                .query_vote(&self.fr, UserId(uid), PathId(1))
                .unwrap()
        }
    }

    #[test]
    fn confirm_baseline_then_revote_is_idempotent() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let out = f.run(1, &RowRequest::new(Choice::Confirm), &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteAccepted]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::Vote {
                old: None,
                new: Some(PathId(1))
            }]
        );
        assert_eq!(f.vote_of(1), Some(PathId(1)));

        let out = f.run(1, &RowRequest::new(Choice::Confirm), &mut h);
        assert!(!out.changed());
        assert!(h.events().is_empty());
        assert_eq!(f.vote_of(1), Some(PathId(1)));
    }

    #[test]
    fn abstain_removes_vote() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(1, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        let out = f.run(1, &RowRequest::new(Choice::Abstain), &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteRemoved]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::Vote {
                old: Some(PathId(1)),
                new: None
            }]
        );
        assert_eq!(f.vote_of(1), None);

        // Nothing left to retract.
        let out = f.run(1, &RowRequest::new(Choice::Abstain), &mut h);
        assert!(out.results.is_empty());
        assert!(h.events().is_empty());
    }

    #[test]
    fn submitter_abstain_is_not_undone() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(2, &RowRequest::change_to("Allemand", None), &mut NullResultHandler);
        assert_eq!(f.vote_of(2), Some(PathId(2)));

        let out = f.run(2, &RowRequest::new(Choice::Abstain), &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteRemoved]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::Vote {
                old: Some(PathId(2)),
                new: None
            }]
        );
        assert_eq!(f.vote_of(2), None);

        // Later changes on the row leave the retraction alone.
        f.run(1, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        assert_eq!(f.vote_of(2), None);
        assert!(f
            .row()
            .item_by_tag("proposed-u2-1")
            .map(|it| it.votes.is_empty())
            .unwrap());
    }

    #[test]
    fn submit_then_reread() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let out = f.run(2, &RowRequest::change_to("Allemand", Some("ref")), &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::ValueAdded, SubmissionResult::VoteAccepted]
        );
        assert_eq!(
            h.take_events(),
            vec![
                SubmissionEvent::NewValue {
                    value: "Allemand".to_string(),
                    had_errors: false
                },
                SubmissionEvent::Vote {
                    old: None,
                    new: Some(PathId(2))
                },
            ]
        );
        let row = f.row();
        let it = row.item_by_tag("proposed-u2-1").unwrap();
        assert_eq!(it.value, "Allemand");
        assert_eq!(it.reference.as_deref(), Some("ref"));
        assert_eq!(it.submitter, Some(UserId(2)));
        assert!(it.votes.contains(&UserId(2)));

        // Same value again: already the vote.
        let out = f.run(2, &RowRequest::change_to("Allemand", None), &mut h);
        assert!(out.results.is_empty());
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::AlreadyVotingFor {
                tag: "proposed-u2-1".to_string()
            }]
        );

        // Another user posting it votes for the existing item.
        let out = f.run(1, &RowRequest::change_to("Allemand", None), &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteAccepted]);
        assert_eq!(f.vote_of(1), Some(PathId(2)));
        assert_eq!(
            h.take_events()[0],
            SubmissionEvent::AcceptedAsVoteFor {
                tag: "proposed-u2-1".to_string()
            }
        );
    }

    #[test]
    fn empty_change_to_mutates_nothing() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let out = f.run(1, &RowRequest::change_to("", None), &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::ValueRejected(RejectReason::EmptyValue)]
        );
        assert_eq!(h.events(), &[SubmissionEvent::EmptyChangeTo]);
        assert_eq!(f.db.vote_count(), 0);
        assert_eq!(f.row().items.len(), 1);
    }

    #[test]
    fn rejected_value_is_not_written() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let out = f.run(2, &RowRequest::change_to("Allemand ", None), &mut h);
        assert!(!out.changed());
        let events = h.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SubmissionEvent::Error { .. }));
        assert_eq!(
            events[1],
            SubmissionEvent::ProposedValue {
                value: "Allemand ".to_string()
            }
        );
        assert_eq!(f.row().items.len(), 1);
        assert_eq!(f.vote_of(2), None);

        // A handler accepting errors lets it through.
        let mut h = JsonResultHandler::new().accepting_errors();
        let out = f.run(2, &RowRequest::change_to("Allemand ", None), &mut h);
        assert!(out.changed());
        assert!(h.events().contains(&SubmissionEvent::NewValue {
            value: "Allemand ".to_string(),
            had_errors: true
        }));
    }

    #[test]
    fn street_user_cannot_vote_and_readonly_blocks_everyone() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        // Move user 3 out of fr.
        f.users[2].locales = vec![Locale::new("de")];
        let out = f.run(3, &RowRequest::new(Choice::Confirm), &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::PermissionDenied(Action::Vote)]
        );
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::NoPermission {
                tag: Some("current".to_string()),
                action: "vote".to_string()
            }]
        );

        f.rules.readonly = true;
        let out = f.run(1, &RowRequest::change_to("Allemand", None), &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::PermissionDenied(Action::Submit)]
        );
    }

    #[test]
    fn inherited_choice_submits_a_copy() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let fr_ca = Locale::new("fr_CA");
        f.users[0].locales = vec![fr_ca.clone()];
        let row = load_row(&mut f.db, &fr_ca, DE).unwrap();
        assert_eq!(row.items[0].tag, CandidateItem::INHERITED_TAG);
        let out = RowProcessor::new(&mut f.db, &f.checks, &f.rules, &f.users[0])
            .process_row(&RowRequest::new(Choice::Confirm), &row, &mut h)
            .unwrap();
        assert_eq!(
            out.results,
            vec![SubmissionResult::ValueAdded, SubmissionResult::VoteAccepted]
        );
        let row = load_row(&mut f.db, &fr_ca, DE).unwrap();
        let it = row.item_by_tag("proposed-u1-1").unwrap();
        assert!(it.is_literal());
        assert_eq!(it.value, "allemand");
    }

    #[test]
    fn delete_with_active_vote() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(2, &RowRequest::change_to("Allemand", None), &mut NullResultHandler);
        assert_eq!(f.vote_of(2), Some(PathId(2)));

        // Not the submitter.
        let mut request = RowRequest::new(Choice::NoAction);
        request.delete_tags.insert("proposed-u2-1".to_string());
        let out = f.run(1, &request, &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::PermissionDenied(Action::Remove)]
        );
        h.take_events();

        let out = f.run(2, &request, &mut h);
        assert_eq!(out.results, vec![SubmissionResult::ItemRemoved]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::RemoveItem {
                tag: "proposed-u2-1".to_string(),
                value: "Allemand".to_string(),
                vote_removed: true
            }]
        );
        assert_eq!(f.vote_of(2), None);
        assert!(f.row().item_by_tag("proposed-u2-1").is_none());
    }

    #[test]
    fn delete_refused_while_others_vote() {
        let mut f = Fixture::new();
        f.run(2, &RowRequest::change_to("Allemand", None), &mut NullResultHandler);
        f.run(1, &RowRequest::new(Choice::parse("proposed-u2-1")), &mut NullResultHandler);
        let mut request = RowRequest::new(Choice::NoAction);
        request.delete_tags.insert("proposed-u2-1".to_string());
        let out = f.run(2, &request, &mut NullResultHandler);
        assert_eq!(
            out.results,
            vec![SubmissionResult::PermissionDenied(Action::Remove)]
        );
        assert!(f.row().item_by_tag("proposed-u2-1").is_some());
    }

    #[test]
    fn tc_removes_votes() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(1, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        f.run(2, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        let mut request = RowRequest::new(Choice::NoAction);
        request.unvote_tags.insert("current".to_string());

        let out = f.run(1, &request, &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::PermissionDenied(Action::Vote)]
        );
        h.take_events();

        let out = f.run(7, &request, &mut h);
        assert_eq!(
            out.results,
            vec![SubmissionResult::VoteRemoved, SubmissionResult::VoteRemoved]
        );
        assert_eq!(
            h.take_events(),
            vec![
                SubmissionEvent::RemoveVote {
                    voter: UserId(1),
                    tag: "current".to_string()
                },
                SubmissionEvent::RemoveVote {
                    voter: UserId(2),
                    tag: "current".to_string()
                },
            ]
        );
        assert_eq!(f.vote_of(1), None);
        assert_eq!(f.vote_of(2), None);
    }

    #[test]
    fn tc_unvote_of_submitter_is_not_undone() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(2, &RowRequest::change_to("Allemand", None), &mut NullResultHandler);
        let mut request = RowRequest::new(Choice::NoAction);
        request.unvote_tags.insert("proposed-u2-1".to_string());

        let out = f.run(7, &request, &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteRemoved]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::RemoveVote {
                voter: UserId(2),
                tag: "proposed-u2-1".to_string()
            }]
        );
        assert_eq!(f.vote_of(2), None);

        // Voting again is the submitter's own choice.
        f.run(2, &RowRequest::new(Choice::parse("proposed-u2-1")), &mut NullResultHandler);
        assert_eq!(f.vote_of(2), Some(PathId(2)));
    }

    #[test]
    fn admin_votes_are_recorded_as_admin() {
        let mut f = Fixture::new();
        f.run(9, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        f.run(1, &RowRequest::new(Choice::Confirm), &mut NullResultHandler);
        let kinds: Vec<(UserId, VoteKind)> = f
            .db
            .voters(&f.fr, PathId(1))
            .unwrap()
            .iter()
            .map(|v| (v.voter, v.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (UserId(1), VoteKind::Explicit),
                (UserId(9), VoteKind::Admin)
            ]
        );
    }

    #[test]
    fn deleting_a_vanished_item_reports_the_vote_removal() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        f.run(2, &RowRequest::change_to("Allemand", None), &mut NullResultHandler);
        let stale = f.row();
        let xpath = stale.item_by_tag("proposed-u2-1").unwrap().xpath.clone();
        assert!(f.db.remove_value(&f.fr, &xpath).unwrap());

        let mut request = RowRequest::new(Choice::NoAction);
        request.delete_tags.insert("proposed-u2-1".to_string());
        let out = f.run_on(2, &request, &stale, &mut h);
        assert_eq!(out.results, vec![SubmissionResult::VoteRemoved]);
        assert_eq!(
            h.take_events(),
            vec![SubmissionEvent::Vote {
                old: Some(PathId(2)),
                new: None
            }]
        );
        assert_eq!(f.vote_of(2), None);
    }

    #[test]
    fn unknown_choice_is_reported() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let out = f.run(1, &RowRequest::new(Choice::parse("bogus")), &mut h);
        assert_eq!(out.results, vec![SubmissionResult::UnknownChoice]);
        assert_eq!(
            h.events(),
            &[SubmissionEvent::UnknownChoice {
                choice: "bogus".to_string()
            }]
        );
    }

    #[test]
    fn section_updates_results_once() {
        let mut f = Fixture::new();
        let mut h = JsonResultHandler::new();
        let row = f.row();
        let rows = vec![
            (RowRequest::new(Choice::Confirm), row.clone()),
            (RowRequest::new(Choice::NoAction), row),
        ];
        let user = f.users[0].clone();
        let changed = RowProcessor::new(&mut f.db, &f.checks, &f.rules, &user)
            .process_section_changes(&rows, &mut h)
            .unwrap();
        assert!(changed);
        assert_eq!(
            h.events().last(),
            Some(&SubmissionEvent::ResultCount { count: 1 })
        );
        assert_eq!(
            f.db.result_status(&f.fr, PathId(1)).unwrap(),
            Some(ResultStatus::Insufficient)
        );
    }
}
