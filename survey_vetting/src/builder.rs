use log::debug;
use std::collections::BTreeSet;

pub use crate::config::*;
use crate::error::VettingResult;
use crate::ledger::{DataSource, StoredValue};
use crate::xpath;

/// A builder for the data row of one base path.
///
/// ```
/// use survey_vetting::builder::RowBuilder;
/// use survey_vetting::{Locale, PathId, StoredValue, UserId};
///
/// let xpath = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";
/// let mut builder = RowBuilder::new(Locale::new("fr"), xpath, PathId(1));
/// builder.add_value(PathId(1), StoredValue {
///     xpath: xpath.to_string(),
///     base: PathId(1),
///     value: "allemand".to_string(),
///     submitter: None,
///     reference: None,
/// });
/// builder.add_vote(UserId(4), PathId(1));
/// builder.winner(Some(PathId(1)));
///
/// let row = builder.build();
/// assert_eq!(row.item_by_tag("current").map(|it| it.votes.len()), Some(1));
/// ```
pub struct RowBuilder {
    _locale: Locale,
    _base_xpath: String,
    _base: PathId,
    _items: Vec<CandidateItem>,
    _winner: Option<PathId>,
}

impl RowBuilder {
    pub fn new(locale: Locale, base_xpath: &str, base: PathId) -> RowBuilder {
        RowBuilder {
            _locale: locale,
            _base_xpath: base_xpath.to_string(),
            _base: base,
            _items: Vec::new(),
            _winner: None,
        }
    }

    /// Adds a value stored in this locale.
    pub fn add_value(&mut self, id: PathId, stored: StoredValue) {
        let tag = if id == self._base {
            CandidateItem::CURRENT_TAG.to_string()
        } else {
            xpath::alt_proposed(&stored.xpath).unwrap_or_else(|| stored.xpath.clone())
        };
        self._items.push(CandidateItem {
            path_id: id,
            xpath: stored.xpath,
            value: stored.value,
            tag,
            submitter: stored.submitter,
            reference: stored.reference,
            inherit_from: None,
            is_fallback: false,
            is_aliased: false,
            is_current: false,
            votes: BTreeSet::new(),
        });
    }

    /// Adds the value this locale inherits from `from`.
    pub fn add_inherited(&mut self, from: Locale, stored: StoredValue) {
        self._items.push(CandidateItem {
            path_id: self._base,
            xpath: self._base_xpath.clone(),
            value: stored.value,
            tag: CandidateItem::INHERITED_TAG.to_string(),
            submitter: None,
            reference: stored.reference,
            is_fallback: from.is_root(),
            inherit_from: Some(from),
            is_aliased: false,
            is_current: false,
            votes: BTreeSet::new(),
        });
    }

    pub fn has_baseline(&self) -> bool {
        self._items.iter().any(|it| it.path_id == self._base)
    }

    pub fn add_vote(&mut self, voter: UserId, target: PathId) {
        match self._items.iter_mut().find(|it| it.path_id == target) {
            Some(it) => {
                it.votes.insert(voter);
            }
            None => debug!(
                "add_vote: {}:{} vote of {} for {} has no item",
                self._locale, self._base_xpath, voter, target
            ),
        }
    }

    pub fn winner(&mut self, winner: Option<PathId>) {
        self._winner = winner;
    }

    pub fn build(self) -> DataRow {
        let winner = self._winner;
        let items = self
            ._items
            .into_iter()
            .map(|it| CandidateItem {
                is_current: Some(it.path_id) == winner,
                ..it
            })
            .collect();
        DataRow {
            locale: self._locale,
            base_xpath: self._base_xpath,
            base_path_id: self._base,
            items,
            winning_path: winner,
        }
    }
}

/// Reads the row of `xpath` in `locale` from the data source.
///
/// Without a value at the base path, the nearest parent locale holding one
/// provides an inherited item.
pub fn load_row(source: &mut dyn DataSource, locale: &Locale, xpath: &str) -> VettingResult<DataRow> {
    let base_xpath = xpath::base_path(xpath);
    let base = source.intern_path(&base_xpath)?;
    let mut builder = RowBuilder::new(locale.clone(), &base_xpath, base);
    for (id, stored) in source.items_for_base(locale, base)? {
        builder.add_value(id, stored);
    }

    if !builder.has_baseline() {
        let mut cur = locale.parent();
        while let Some(parent) = cur {
            let from_winner = match source.winning_path(&parent, base)? {
                Some(w) => source.value_at(&parent, &source.xpath_for(w)?)?,
                None => None,
            };
            let found = match from_winner {
                Some(v) => Some(v),
                None => source.value_at(&parent, &base_xpath)?,
            };
            if let Some(stored) = found {
                debug!(
                    "load_row: {}:{} inherits {:?} from {}",
                    locale, base_xpath, stored.value, parent
                );
                builder.add_inherited(parent, stored);
                break;
            }
            cur = parent.parent();
        }
    }

    for rec in source.voters(locale, base)? {
        builder.add_vote(rec.voter, rec.target);
    }
    builder.winner(source.winning_path(locale, base)?);
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocaleScope, VoteKind};
    use crate::ledger::{ValueStore, VoteLedger};
    use crate::memory::MemoryDb;
    use crate::registry::UserRegistry;
    use std::sync::Arc;

    const DE: &str = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";

    fn db() -> MemoryDb {
        MemoryDb::new(Arc::new(UserRegistry::default()))
    }

    #[test]
    fn literal_and_proposed_items() {
        let mut db = db();
        let fr = Locale::new("fr");
        db.put_value(&fr, DE, "allemand", None, None).unwrap();
        let p = xpath::with_proposed_alt(DE, "proposed-u2-1");
        let pid = db
            .put_value(&fr, &p, "Allemand", Some(UserId(2)), Some("r1"))
            .unwrap();
        db.vote(&fr, PathId(1), UserId(2), pid, VoteKind::Explicit)
            .unwrap();

        let row = load_row(&mut db, &fr, &p).unwrap();
        assert_eq!(row.base_xpath, DE);
        assert_eq!(row.items.len(), 2);
        let current = row.item_by_tag("current").unwrap();
        assert!(current.is_literal());
        assert_eq!(current.value, "allemand");
        let proposed = row.item_by_tag("proposed-u2-1").unwrap();
        assert_eq!(proposed.submitter, Some(UserId(2)));
        assert_eq!(proposed.reference.as_deref(), Some("r1"));
        assert!(proposed.votes.contains(&UserId(2)));
    }

    #[test]
    fn inherits_from_nearest_parent() {
        let mut db = db();
        db.put_value(&Locale::root(), DE, "German", None, None)
            .unwrap();
        let row = load_row(&mut db, &Locale::new("fr_CA"), DE).unwrap();
        assert_eq!(row.items.len(), 1);
        let it = &row.items[0];
        assert_eq!(it.tag, CandidateItem::INHERITED_TAG);
        assert_eq!(it.inherit_from, Some(Locale::root()));
        assert!(it.is_fallback);
        assert!(!it.is_literal());

        db.put_value(&Locale::new("fr"), DE, "allemand", None, None)
            .unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        let row = load_row(&mut db, &Locale::new("fr_CA"), DE).unwrap();
        let it = &row.items[0];
        assert_eq!(it.value, "allemand");
        assert_eq!(it.inherit_from, Some(Locale::new("fr")));
        assert!(!it.is_fallback);
    }

    #[test]
    fn winner_is_marked_current() {
        let mut db = db();
        let fr = Locale::new("fr");
        db.put_value(&fr, DE, "allemand", None, None).unwrap();
        db.update_results(&LocaleScope::All).unwrap();
        let row = load_row(&mut db, &fr, DE).unwrap();
        assert_eq!(row.winning_path, Some(PathId(1)));
        assert!(row.items[0].is_current);
    }
}
