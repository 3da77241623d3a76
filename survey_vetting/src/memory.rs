//! In-memory vote ledger and value store.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::*;
use crate::error::*;
use crate::ledger::*;
use crate::registry::{User, UserRegistry};
use crate::xpath;

#[derive(Debug, Default)]
struct PathTable {
    by_path: HashMap<String, PathId>,
    // Id n is stored at index n - 1.
    by_id: Vec<String>,
}

impl PathTable {
    fn intern(&mut self, xpath: &str) -> PathId {
        if let Some(id) = self.by_path.get(xpath) {
            return *id;
        }
        self.by_id.push(xpath.to_string());
        let id = PathId(self.by_id.len() as u32);
        self.by_path.insert(xpath.to_string(), id);
        id
    }

    fn get(&self, xpath: &str) -> Option<PathId> {
        self.by_path.get(xpath).cloned()
    }

    fn xpath(&self, id: PathId) -> Option<&str> {
        if id.0 == 0 {
            return None;
        }
        self.by_id.get((id.0 - 1) as usize).map(|s| s.as_str())
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct Resolved {
    winner: Option<PathId>,
    status: ResultStatus,
}

/// One path that can be voted for, with the voters collected so far.
#[derive(Debug)]
struct Chad<'a> {
    target: PathId,
    voters: Vec<&'a User>,
    admin_voted: bool,
    quorum: bool,
    // At least one vetter voted for it.
    someone_voted: bool,
    // A vote for this path is a vote to remove the item.
    removal: bool,
}

impl<'a> Chad<'a> {
    fn new(target: PathId, removal: bool) -> Chad<'a> {
        Chad {
            target,
            voters: Vec::new(),
            admin_voted: false,
            quorum: false,
            someone_voted: false,
            removal,
        }
    }

    fn add(&mut self, u: &'a User) {
        self.voters.push(u);
        if u.is_vetter() {
            self.someone_voted = true;
        }
        if u.is_admin() {
            self.admin_voted = true;
            self.quorum = true;
        } else if u.is_expert() {
            self.quorum = true;
        } else if u.is_vetter() && !self.quorum {
            // Two vetters from different organizations agree.
            self.quorum = self
                .voters
                .iter()
                .any(|them| them.org != u.org && them.is_vetter());
        }
    }
}

/// Values and votes kept in memory, keyed the way the survey database keys them.
#[derive(Debug)]
pub struct MemoryDb {
    registry: Arc<UserRegistry>,
    paths: PathTable,
    data: BTreeMap<Locale, BTreeMap<PathId, StoredValue>>,
    votes: BTreeMap<(Locale, PathId, UserId), VoteRecord>,
    results: HashMap<(Locale, PathId), Resolved>,
    // Base paths whose result is out of date.
    dirty: BTreeSet<(Locale, PathId)>,
    // Votes removed on purpose. No implied vote replaces them.
    retracted: BTreeSet<(Locale, PathId, UserId)>,
}

impl MemoryDb {
    pub fn new(registry: Arc<UserRegistry>) -> MemoryDb {
        MemoryDb {
            registry,
            paths: PathTable::default(),
            data: BTreeMap::new(),
            votes: BTreeMap::new(),
            results: HashMap::new(),
            dirty: BTreeSet::new(),
            retracted: BTreeSet::new(),
        }
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    fn votes_for<'s>(
        &'s self,
        locale: &Locale,
        base: PathId,
    ) -> impl Iterator<Item = &'s VoteRecord> + 's {
        let lo = (locale.clone(), base, UserId(0));
        let hi = (locale.clone(), base, UserId(u32::MAX));
        self.votes.range(lo..=hi).map(|(_, v)| v)
    }

    fn is_removal(&self, locale: &Locale, base: PathId, target: PathId) -> bool {
        match self.data.get(locale).and_then(|m| m.get(&target)) {
            None => true,
            Some(sv) => sv.value.is_empty() && target != base,
        }
    }

    fn resolve(&self, locale: &Locale, base: PathId) -> VettingResult<Resolved> {
        let mut chads: BTreeMap<PathId, Chad<'_>> = BTreeMap::new();
        for rec in self.votes_for(locale, base) {
            let user = match self.registry.get(rec.voter) {
                Some(u) => u,
                None => {
                    warn!(
                        "resolve: {}:{} ignoring vote of unknown user {}",
                        locale, base, rec.voter
                    );
                    continue;
                }
            };
            let removal = self.is_removal(locale, base, rec.target);
            chads
                .entry(rec.target)
                .or_insert_with(|| Chad::new(rec.target, removal))
                .add(user);
        }

        let mut status: Option<ResultStatus> = None;
        let mut result: Option<PathId> = None;
        let mut fallback: Option<PathId> = None;

        if !chads.is_empty() {
            let mut number_voted_for = 0;
            let mut quorum_chad: Option<&Chad<'_>> = None;
            let mut admin_chad: Option<&Chad<'_>> = None;
            for c in chads.values() {
                debug!("resolve: {}:{} {:?}", locale, base, c);
                if admin_chad.is_none() && c.admin_voted {
                    admin_chad = Some(c);
                }
                if c.someone_voted {
                    number_voted_for += 1;
                    if number_voted_for > 1 {
                        status = Some(ResultStatus::Disputed);
                    }
                }
                if c.quorum {
                    if quorum_chad.is_some() {
                        status = Some(ResultStatus::Disputed);
                    } else {
                        quorum_chad = Some(c);
                    }
                }
            }
            if status == Some(ResultStatus::Disputed) {
                if let Some(a) = admin_chad {
                    status = Some(if a.removal {
                        ResultStatus::Removal
                    } else {
                        ResultStatus::Admin
                    });
                    result = Some(a.target);
                    fallback = result;
                }
            }
            if status.is_none() {
                match quorum_chad {
                    Some(q) => {
                        status = Some(if q.removal {
                            ResultStatus::Removal
                        } else if chads.len() == 1 {
                            ResultStatus::Unanimous
                        } else if q.admin_voted {
                            ResultStatus::Admin
                        } else {
                            ResultStatus::Good
                        });
                        result = Some(q.target);
                        fallback = result;
                    }
                    None => {
                        status = Some(ResultStatus::Insufficient);
                    }
                }
            }
        }

        if result.is_none() {
            let items = self.items_for_base(locale, base)?;
            let mut saw_proposed = false;
            let mut existing: Option<PathId> = None;
            for (id, sv) in items.iter() {
                if *id == base && fallback.is_none() {
                    fallback = Some(base);
                }
                if xpath::alt_proposed(&sv.xpath).is_some() || sv.xpath.contains("[@draft=") {
                    saw_proposed = true;
                } else {
                    existing = Some(*id);
                }
            }
            if fallback.is_none() {
                fallback = existing;
            }
            if status.is_none() {
                if items.len() == 1 && existing.is_some() && !saw_proposed {
                    result = existing;
                    status = Some(ResultStatus::NoChange);
                } else {
                    status = Some(ResultStatus::NoVotes);
                }
            }
        }

        let status = match status {
            Some(s) => s,
            None => {
                return ResolutionSnafu {
                    locale: locale.clone(),
                    base,
                    reason: "no type".to_string(),
                }
                .fail()
            }
        };
        if result.is_none() && !status.is_bad() {
            return ResolutionSnafu {
                locale: locale.clone(),
                base,
                reason: format!("no result path and status is {:?}", status),
            }
            .fail();
        }
        Ok(Resolved {
            winner: result.or(fallback),
            status,
        })
    }
}

impl VoteLedger for MemoryDb {
    fn query_vote(
        &self,
        locale: &Locale,
        user: UserId,
        base: PathId,
    ) -> VettingResult<Option<PathId>> {
        Ok(self
            .votes
            .get(&(locale.clone(), base, user))
            .map(|v| v.target))
    }

    fn vote(
        &mut self,
        locale: &Locale,
        base: PathId,
        user: UserId,
        target: PathId,
        kind: VoteKind,
    ) -> VettingResult<()> {
        debug!(
            "vote: {}:{} {} -> {} ({:?})",
            locale, base, user, target, kind
        );
        let key = (locale.clone(), base, user);
        self.retracted.remove(&key);
        self.votes.insert(
            key,
            VoteRecord {
                voter: user,
                target,
                kind,
            },
        );
        self.dirty.insert((locale.clone(), base));
        Ok(())
    }

    fn unvote(&mut self, locale: &Locale, base: PathId, user: UserId) -> VettingResult<usize> {
        let key = (locale.clone(), base, user);
        let removed = self.votes.remove(&key);
        debug!("unvote: {}:{} {} removed: {:?}", locale, base, user, removed);
        if removed.is_some() {
            self.retracted.insert(key);
            self.dirty.insert((locale.clone(), base));
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn voters(&self, locale: &Locale, base: PathId) -> VettingResult<Vec<VoteRecord>> {
        Ok(self.votes_for(locale, base).cloned().collect())
    }

    fn update_results(&mut self, scope: &LocaleScope) -> VettingResult<usize> {
        let mut stale: BTreeSet<(Locale, PathId)> = self
            .dirty
            .iter()
            .filter(|(l, _)| scope.includes(l))
            .cloned()
            .collect();
        // Base paths with data but no result yet.
        for (locale, values) in self.data.iter().filter(|(l, _)| scope.includes(l)) {
            for sv in values.values() {
                let key = (locale.clone(), sv.base);
                if !self.results.contains_key(&key) {
                    stale.insert(key);
                }
            }
        }
        for (locale, base) in stale.iter() {
            let resolved = self.resolve(locale, *base)?;
            debug!(
                "update_results: {}:{} -> {:?}",
                locale, base, resolved
            );
            self.results.insert((locale.clone(), *base), resolved);
            self.dirty.remove(&(locale.clone(), *base));
        }
        if !stale.is_empty() {
            info!("update_results: {} results updated", stale.len());
        }
        Ok(stale.len())
    }

    fn update_implied_votes(&mut self, scope: &LocaleScope) -> VettingResult<usize> {
        // For each submitter without a vote, their latest submission on the base path.
        // A submitter who retracted their vote stays without one.
        let mut missing: BTreeMap<(Locale, PathId, UserId), PathId> = BTreeMap::new();
        for (locale, values) in self.data.iter().filter(|(l, _)| scope.includes(l)) {
            for (id, sv) in values.iter() {
                if let Some(submitter) = sv.submitter {
                    let key = (locale.clone(), sv.base, submitter);
                    if self.votes.contains_key(&key) || self.retracted.contains(&key) {
                        continue;
                    }
                    let target = missing.entry(key).or_insert(*id);
                    if *id > *target {
                        *target = *id;
                    }
                }
            }
        }
        for ((locale, base, user), target) in missing.iter() {
            self.votes.insert(
                (locale.clone(), *base, *user),
                VoteRecord {
                    voter: *user,
                    target: *target,
                    kind: VoteKind::Implied,
                },
            );
            self.dirty.insert((locale.clone(), *base));
        }
        if !missing.is_empty() {
            info!("update_implied_votes: added {} implied votes", missing.len());
        }
        Ok(missing.len())
    }

    fn winning_path(&self, locale: &Locale, base: PathId) -> VettingResult<Option<PathId>> {
        Ok(self
            .results
            .get(&(locale.clone(), base))
            .and_then(|r| r.winner))
    }

    fn result_status(&self, locale: &Locale, base: PathId) -> VettingResult<Option<ResultStatus>> {
        Ok(self.results.get(&(locale.clone(), base)).map(|r| r.status))
    }
}

impl ValueStore for MemoryDb {
    fn intern_path(&mut self, xpath: &str) -> VettingResult<PathId> {
        Ok(self.paths.intern(xpath))
    }

    fn path_id(&self, xpath: &str) -> VettingResult<Option<PathId>> {
        Ok(self.paths.get(xpath))
    }

    fn xpath_for(&self, id: PathId) -> VettingResult<String> {
        self.paths
            .xpath(id)
            .map(|s| s.to_string())
            .ok_or(VettingError::UnknownPath { id })
    }

    fn put_value(
        &mut self,
        locale: &Locale,
        xpath: &str,
        value: &str,
        submitter: Option<UserId>,
        reference: Option<&str>,
    ) -> VettingResult<PathId> {
        let base = self.paths.intern(&xpath::base_path(xpath));
        let id = self.paths.intern(xpath);
        debug!("put_value: {}:{} ({}) = {:?}", locale, id, xpath, value);
        self.data.entry(locale.clone()).or_default().insert(
            id,
            StoredValue {
                xpath: xpath.to_string(),
                base,
                value: value.to_string(),
                submitter,
                reference: reference.map(|r| r.to_string()),
            },
        );
        self.dirty.insert((locale.clone(), base));
        Ok(id)
    }

    fn remove_value(&mut self, locale: &Locale, xpath: &str) -> VettingResult<bool> {
        let id = match self.paths.get(xpath) {
            Some(id) => id,
            None => return Ok(false),
        };
        let removed = self.data.get_mut(locale).and_then(|m| m.remove(&id));
        match removed {
            Some(sv) => {
                debug!("remove_value: {}:{} ({})", locale, id, xpath);
                self.dirty.insert((locale.clone(), sv.base));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn has_value(&self, locale: &Locale, xpath: &str) -> VettingResult<bool> {
        Ok(self.value_at(locale, xpath)?.is_some())
    }

    fn value_at(&self, locale: &Locale, xpath: &str) -> VettingResult<Option<StoredValue>> {
        Ok(self
            .paths
            .get(xpath)
            .and_then(|id| self.data.get(locale).and_then(|m| m.get(&id)))
            .cloned())
    }

    fn items_for_base(
        &self,
        locale: &Locale,
        base: PathId,
    ) -> VettingResult<Vec<(PathId, StoredValue)>> {
        Ok(self
            .data
            .get(locale)
            .map(|m| {
                m.iter()
                    .filter(|(_, sv)| sv.base == base)
                    .map(|(id, sv)| (*id, sv.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn locales(&self) -> VettingResult<Vec<Locale>> {
        Ok(self.data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UserLevel;

    const DE: &str = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";

    fn user(id: u32, org: &str, level: UserLevel) -> User {
        User {
            id: UserId(id),
            email: format!("u{}@{}.example", id, org),
            org: org.to_string(),
            level,
            locales: vec![],
        }
    }

    fn db() -> MemoryDb {
        let registry = UserRegistry::new(vec![
            user(1, "acme", UserLevel::Vetter),
            user(2, "globex", UserLevel::Vetter),
            user(3, "acme", UserLevel::Vetter),
            user(4, "initech", UserLevel::Expert),
            user(9, "unicode", UserLevel::Admin),
        ]);
        MemoryDb::new(Arc::new(registry))
    }

    fn fr() -> Locale {
        Locale::new("fr")
    }

    fn proposed(n: u32) -> String {
        xpath::with_proposed_alt(DE, &xpath::proposed_tag(n, 1))
    }

    #[test]
    fn existing_data_without_votes_is_no_change() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        assert_eq!(db.update_results(&LocaleScope::All).unwrap(), 1);
        assert_eq!(db.winning_path(&fr(), base).unwrap(), Some(base));
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::NoChange)
        );
        // Nothing is stale any more.
        assert_eq!(db.update_results(&LocaleScope::All).unwrap(), 0);
    }

    #[test]
    fn proposal_without_votes_falls_back_to_base() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        db.put_value(&fr(), &proposed(1), "Allemand", None, None)
            .unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::NoVotes)
        );
        assert_eq!(db.winning_path(&fr(), base).unwrap(), Some(base));
    }

    #[test]
    fn vetters_of_different_orgs_reach_quorum() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        let p = db
            .put_value(&fr(), &proposed(1), "Allemand", Some(UserId(1)), None)
            .unwrap();
        db.vote(&fr(), base, UserId(1), p, VoteKind::Explicit).unwrap();
        db.vote(&fr(), base, UserId(3), p, VoteKind::Explicit).unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        // Same organization: no quorum.
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::Insufficient)
        );

        db.vote(&fr(), base, UserId(2), p, VoteKind::Explicit).unwrap();
        db.update_results(&LocaleScope::Locale(fr())).unwrap();
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::Unanimous)
        );
        assert_eq!(db.winning_path(&fr(), base).unwrap(), Some(p));
    }

    #[test]
    fn split_vetter_votes_are_disputed_unless_admin_voted() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        let p = db
            .put_value(&fr(), &proposed(1), "Allemand", Some(UserId(1)), None)
            .unwrap();
        db.vote(&fr(), base, UserId(1), p, VoteKind::Explicit).unwrap();
        db.vote(&fr(), base, UserId(2), base, VoteKind::Explicit)
            .unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::Disputed)
        );

        db.vote(&fr(), base, UserId(9), base, VoteKind::Admin).unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::Admin)
        );
        assert_eq!(db.winning_path(&fr(), base).unwrap(), Some(base));
    }

    #[test]
    fn expert_vote_alone_wins() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        let p = db
            .put_value(&fr(), &proposed(4), "Allemand", Some(UserId(4)), None)
            .unwrap();
        db.vote(&fr(), base, UserId(4), p, VoteKind::Explicit).unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        assert_eq!(
            db.result_status(&fr(), base).unwrap(),
            Some(ResultStatus::Unanimous)
        );
        assert_eq!(db.winning_path(&fr(), base).unwrap(), Some(p));
    }

    #[test]
    fn implied_votes_point_at_latest_submission() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        db.put_value(&fr(), &proposed(1), "Allemand", Some(UserId(1)), None)
            .unwrap();
        let second = xpath::with_proposed_alt(DE, &xpath::proposed_tag(1, 2));
        let p2 = db
            .put_value(&fr(), &second, "allemand (DE)", Some(UserId(1)), None)
            .unwrap();
        assert_eq!(db.update_implied_votes(&LocaleScope::All).unwrap(), 1);
        assert_eq!(db.query_vote(&fr(), UserId(1), base).unwrap(), Some(p2));
        // Already voting: nothing more to imply.
        assert_eq!(db.update_implied_votes(&LocaleScope::All).unwrap(), 0);
        let votes = db.voters(&fr(), base).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].kind, VoteKind::Implied);
    }

    #[test]
    fn unvote_reports_rows_affected() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        db.vote(&fr(), base, UserId(1), base, VoteKind::Explicit)
            .unwrap();
        assert_eq!(db.unvote(&fr(), base, UserId(1)).unwrap(), 1);
        assert_eq!(db.unvote(&fr(), base, UserId(1)).unwrap(), 0);
        assert_eq!(db.query_vote(&fr(), UserId(1), base).unwrap(), None);
    }

    #[test]
    fn retracted_vote_is_not_implied_again() {
        let mut db = db();
        let base = db.put_value(&fr(), DE, "allemand", None, None).unwrap();
        let p1 = db
            .put_value(&fr(), &proposed(1), "Allemand", Some(UserId(1)), None)
            .unwrap();
        db.vote(&fr(), base, UserId(1), p1, VoteKind::Explicit)
            .unwrap();
        assert_eq!(db.unvote(&fr(), base, UserId(1)).unwrap(), 1);
        assert_eq!(db.update_implied_votes(&LocaleScope::All).unwrap(), 0);
        assert_eq!(db.query_vote(&fr(), UserId(1), base).unwrap(), None);
    }

    #[test]
    fn path_table_round_trip() {
        let mut db = db();
        let id = db.intern_path(DE).unwrap();
        assert_eq!(db.intern_path(DE).unwrap(), id);
        assert_eq!(db.xpath_for(id).unwrap(), DE);
        assert!(db.xpath_for(PathId(77)).is_err());
        assert_eq!(db.path_id("//ldml/nothing").unwrap(), None);
    }
}
