//! Correctness checks run on posted values, and the decision to accept them.

use log::{debug, info};

use crate::config::*;
use crate::handler::ResultHandler;

/// A correctness check for one value at one path.
pub trait Checker {
    fn check(&self, locale: &Locale, xpath: &str, value: &str) -> Vec<CheckStatus>;
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Validation {
    Accepted { had_errors: bool },
    Rejected(Vec<CheckStatus>),
}

pub struct SubmissionValidator<'a> {
    checker: &'a dyn Checker,
    rules: &'a SubmissionRules,
}

impl<'a> SubmissionValidator<'a> {
    pub fn new(checker: &'a dyn Checker, rules: &'a SubmissionRules) -> SubmissionValidator<'a> {
        SubmissionValidator { checker, rules }
    }

    /// Runs the checks on a value about to be stored at `xpath`.
    ///
    /// Every status goes to `handle_error`, in order, before any decision. When
    /// some status is a blocking error the handler is asked once whether to
    /// refuse the value.
    pub fn validate(
        &self,
        row: &DataRow,
        xpath: &str,
        value: &str,
        handler: &mut dyn ResultHandler,
    ) -> Validation {
        let statuses = self.checker.check(&row.locale, xpath, value);
        for status in statuses.iter() {
            handler.handle_error(row, status, value);
        }
        let errors: Vec<CheckStatus> = statuses
            .into_iter()
            .filter(|s| s.kind == StatusKind::Error && !self.rules.is_advisory(s))
            .collect();
        if errors.is_empty() {
            return Validation::Accepted { had_errors: false };
        }
        if handler.reject_error_item(row) {
            info!(
                "validate: {}:{} rejected {:?} with {} errors",
                row.locale,
                xpath,
                value,
                errors.len()
            );
            Validation::Rejected(errors)
        } else {
            debug!(
                "validate: {}:{} accepted {:?} despite {} errors",
                row.locale,
                xpath,
                value,
                errors.len()
            );
            Validation::Accepted { had_errors: true }
        }
    }
}

// ********* Checks ***********

/// Leading or trailing whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCheck;

impl WhitespaceCheck {
    pub const CAUSE: &'static str = "CheckWhitespace";
}

impl Checker for WhitespaceCheck {
    fn check(&self, _locale: &Locale, _xpath: &str, value: &str) -> Vec<CheckStatus> {
        if value.trim() != value {
            vec![CheckStatus::error(
                WhitespaceCheck::CAUSE,
                "mustNotStartOrEndWithSpace",
                "Value must not start or end with whitespace",
            )]
        } else {
            vec![]
        }
    }
}

/// Control characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterCheck;

impl CharacterCheck {
    pub const CAUSE: &'static str = "CheckCharacters";
}

impl Checker for CharacterCheck {
    fn check(&self, _locale: &Locale, _xpath: &str, value: &str) -> Vec<CheckStatus> {
        match value.chars().find(|c| c.is_control()) {
            Some(c) => vec![CheckStatus::error(
                CharacterCheck::CAUSE,
                "illegalCharacter",
                &format!("Value contains the control character U+{:04X}", c as u32),
            )],
            None => vec![],
        }
    }
}

/// Values longer than `max_chars` characters.
#[derive(Debug, Clone, Copy)]
pub struct LengthCheck {
    pub max_chars: usize,
}

impl LengthCheck {
    pub const CAUSE: &'static str = "CheckLength";
}

impl Checker for LengthCheck {
    fn check(&self, _locale: &Locale, _xpath: &str, value: &str) -> Vec<CheckStatus> {
        let len = value.chars().count();
        if len > self.max_chars {
            vec![CheckStatus::warning(
                LengthCheck::CAUSE,
                "valueTooWide",
                &format!("Value has {} characters, more than {}", len, self.max_chars),
            )]
        } else {
            vec![]
        }
    }
}

/// Paths outside the prefixes of the current coverage level.
#[derive(Debug, Clone, Default)]
pub struct CoverageCheck {
    pub prefixes: Vec<String>,
}

impl Checker for CoverageCheck {
    fn check(&self, _locale: &Locale, xpath: &str, _value: &str) -> Vec<CheckStatus> {
        if self.prefixes.is_empty() || self.prefixes.iter().any(|p| xpath.starts_with(p)) {
            return vec![];
        }
        vec![CheckStatus::error(
            SubmissionRules::COVERAGE_CAUSE,
            "coverageLevel",
            "Path is outside the configured coverage",
        )]
    }
}

/// Runs several checks and concatenates their statuses.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Box<dyn Checker + Send + Sync>>,
}

impl CheckSet {
    pub fn new() -> CheckSet {
        CheckSet::default()
    }

    pub fn with<C: Checker + Send + Sync + 'static>(mut self, check: C) -> CheckSet {
        self.checks.push(Box::new(check));
        self
    }

    /// Whitespace, characters, length and coverage.
    pub fn standard(max_chars: usize, coverage_prefixes: Vec<String>) -> CheckSet {
        CheckSet::new()
            .with(WhitespaceCheck)
            .with(CharacterCheck)
            .with(LengthCheck { max_chars })
            .with(CoverageCheck {
                prefixes: coverage_prefixes,
            })
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Checker for CheckSet {
    fn check(&self, locale: &Locale, xpath: &str, value: &str) -> Vec<CheckStatus> {
        self.checks
            .iter()
            .flat_map(|c| c.check(locale, xpath, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{JsonResultHandler, SubmissionEvent};

    const DE: &str = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";

    fn row() -> DataRow {
        DataRow {
            locale: Locale::new("fr"),
            base_xpath: DE.to_string(),
            base_path_id: PathId(1),
            items: vec![],
            winning_path: None,
        }
    }

    fn validate(checks: &CheckSet, value: &str, handler: &mut JsonResultHandler) -> Validation {
        let rules = SubmissionRules::default();
        SubmissionValidator::new(checks, &rules).validate(&row(), DE, value, handler)
    }

    #[test]
    fn clean_value_is_accepted() {
        let mut h = JsonResultHandler::new();
        let checks = CheckSet::standard(20, vec![]);
        assert_eq!(
            validate(&checks, "allemand", &mut h),
            Validation::Accepted { had_errors: false }
        );
        assert!(h.events().is_empty());
    }

    #[test]
    fn every_status_reported_before_rejection() {
        let mut h = JsonResultHandler::new();
        let checks = CheckSet::standard(3, vec![]);
        let res = validate(&checks, " allemand", &mut h);
        // The length warning is reported but does not count as an error.
        assert_eq!(
            res,
            Validation::Rejected(vec![CheckStatus::error(
                WhitespaceCheck::CAUSE,
                "mustNotStartOrEndWithSpace",
                "Value must not start or end with whitespace",
            )])
        );
        let causes: Vec<String> = h
            .events()
            .iter()
            .filter_map(|e| match e {
                SubmissionEvent::Error { cause, .. } => Some(cause.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(causes, vec!["CheckWhitespace", "CheckLength"]);
    }

    #[test]
    fn handler_may_accept_errors() {
        let mut h = JsonResultHandler::new().accepting_errors();
        let checks = CheckSet::new().with(CharacterCheck);
        assert_eq!(
            validate(&checks, "alle\u{7}mand", &mut h),
            Validation::Accepted { had_errors: true }
        );
        assert_eq!(h.events().len(), 1);
    }

    #[test]
    fn coverage_errors_are_advisory() {
        let mut h = JsonResultHandler::new();
        let checks = CheckSet::new().with(CoverageCheck {
            prefixes: vec!["//ldml/numbers".to_string()],
        });
        assert_eq!(
            validate(&checks, "allemand", &mut h),
            Validation::Accepted { had_errors: false }
        );
        assert_eq!(h.events().len(), 1);
    }
}
