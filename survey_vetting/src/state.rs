//! The long-lived state of a running survey.

use log::{debug, info};
use snafu::OptionExt;
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use crate::builder::load_row;
use crate::config::*;
use crate::error::*;
use crate::handler::ResultHandler;
use crate::ledger::DataSource;
use crate::processor::RowProcessor;
use crate::registry::{User, UserRegistry};
use crate::validate::Checker;
use crate::worker::BackgroundQueue;

/// Counts returned by a full recount.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct RecountReport {
    pub implied_votes: usize,
    pub results: usize,
}

fn lock<'m, T>(m: &'m Mutex<T>, what: &str) -> VettingResult<MutexGuard<'m, T>> {
    m.lock().map_err(|_| VettingError::LockPoisoned {
        what: what.to_string(),
    })
}

fn recount<D: DataSource>(source: &Mutex<D>) -> VettingResult<RecountReport> {
    let mut src = lock(source, "data source")?;
    let implied_votes = src.update_implied_votes(&LocaleScope::All)?;
    let results = src.update_results(&LocaleScope::All)?;
    info!(
        "recount: {} implied votes added, {} results updated",
        implied_votes, results
    );
    Ok(RecountReport {
        implied_votes,
        results,
    })
}

/// Everything the submission requests share.
///
/// Requests of one session are serialized. Any read-decide-write sequence runs
/// while holding the data source. Rows are loaded before that, under their own
/// lock, so a row can be stale by the time it is processed.
pub struct SurveyState<D: DataSource + Send + 'static> {
    rules: SubmissionRules,
    registry: Arc<UserRegistry>,
    source: Arc<Mutex<D>>,
    checker: Arc<dyn Checker + Send + Sync>,
    sessions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    worker: Mutex<Option<BackgroundQueue>>,
}

impl<D: DataSource + Send + 'static> SurveyState<D> {
    pub fn init(
        rules: SubmissionRules,
        registry: Arc<UserRegistry>,
        source: D,
        checker: Arc<dyn Checker + Send + Sync>,
    ) -> VettingResult<SurveyState<D>> {
        let worker = BackgroundQueue::new("survey-recount")?;
        info!(
            "SurveyState::init: {} users, readonly: {}",
            registry.len(),
            rules.readonly
        );
        Ok(SurveyState {
            rules,
            registry,
            source: Arc::new(Mutex::new(source)),
            checker,
            sessions: Mutex::new(HashMap::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Waits for the queued background jobs and stops the worker.
    pub fn shutdown(&self) -> VettingResult<()> {
        let worker = lock(&self.worker, "worker")?.take();
        if let Some(mut w) = worker {
            w.shutdown();
            info!("SurveyState::shutdown: done");
        }
        Ok(())
    }

    pub fn rules(&self) -> &SubmissionRules {
        &self.rules
    }

    pub fn user(&self, id: UserId) -> VettingResult<&User> {
        self.registry.get(id).context(UnknownUserSnafu { id })
    }

    /// Runs `f` with the data source held.
    pub fn with_source<T>(&self, f: impl FnOnce(&mut D) -> VettingResult<T>) -> VettingResult<T> {
        let mut src = lock(&self.source, "data source")?;
        f(&mut src)
    }

    pub fn load_row(&self, locale: &Locale, xpath: &str) -> VettingResult<DataRow> {
        let mut src = lock(&self.source, "data source")?;
        load_row(&mut *src, locale, xpath)
    }

    fn session_lock(&self, session: &str) -> VettingResult<Arc<Mutex<()>>> {
        let mut sessions = lock(&self.sessions, "sessions")?;
        Ok(Arc::clone(
            sessions
                .entry(session.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    // Forgets the lock of a session once no other request holds it.
    fn release_session(&self, session: &str, held: Arc<Mutex<()>>) -> VettingResult<()> {
        let mut sessions = lock(&self.sessions, "sessions")?;
        // One reference in the map, one in `held`.
        if Arc::strong_count(&held) <= 2 {
            sessions.remove(session);
        }
        Ok(())
    }

    /// Processes the posted fields of one row.
    pub fn submit(
        &self,
        session: &str,
        user: UserId,
        locale: &Locale,
        xpath: &str,
        request: &RowRequest,
        handler: &mut dyn ResultHandler,
    ) -> VettingResult<RowOutcome> {
        let user = self.user(user)?;
        let row = self.load_row(locale, xpath)?;

        let session_lock = self.session_lock(session)?;
        let outcome = {
            let _session = lock(&session_lock, "session")?;
            let mut src = lock(&self.source, "data source")?;
            debug!("submit: session {} user {} on {}:{}", session, user.id, locale, xpath);
            let mut processor = RowProcessor::new(&mut *src, &*self.checker, &self.rules, user);
            processor.process_row(request, &row, handler)
        };
        self.release_session(session, session_lock)?;
        outcome
    }

    /// Processes the rows of one page and updates the results of the changed locales.
    pub fn submit_section(
        &self,
        session: &str,
        user: UserId,
        rows: &[(Locale, String, RowRequest)],
        handler: &mut dyn ResultHandler,
    ) -> VettingResult<bool> {
        let user = self.user(user)?;
        let mut loaded = Vec::with_capacity(rows.len());
        for (locale, xpath, request) in rows {
            loaded.push((request.clone(), self.load_row(locale, xpath)?));
        }

        let session_lock = self.session_lock(session)?;
        let changed = {
            let _session = lock(&session_lock, "session")?;
            let mut src = lock(&self.source, "data source")?;
            let mut processor = RowProcessor::new(&mut *src, &*self.checker, &self.rules, user);
            processor.process_section_changes(&loaded, handler)
        };
        self.release_session(session, session_lock)?;
        changed
    }

    /// Recomputes implied votes and all results on the calling thread.
    pub fn recount(&self) -> VettingResult<RecountReport> {
        recount(&self.source)
    }

    /// Queues a full recount on the background worker.
    pub fn schedule_recount(&self) -> VettingResult<mpsc::Receiver<VettingResult<RecountReport>>> {
        let source = Arc::clone(&self.source);
        let (sender, receiver) = mpsc::channel();
        let worker = lock(&self.worker, "worker")?;
        match worker.as_ref() {
            Some(w) => w.submit(move || {
                // The caller may have stopped waiting.
                let _ = sender.send(recount(&source));
            })?,
            None => return WorkerStoppedSnafu.fail(),
        }
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{JsonResultHandler, NullResultHandler};
    use crate::memory::MemoryDb;
    use crate::registry::UserLevel;
    use crate::validate::CheckSet;
    use crate::ValueStore;
    use std::thread;

    const DE: &str = "//ldml/localeDisplayNames/languages/language[@type=\"de\"]";

    fn state() -> Arc<SurveyState<MemoryDb>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let users: Vec<User> = (1..=4)
            .map(|i| User {
                id: UserId(i),
                email: format!("u{}@example.com", i),
                org: format!("org{}", i),
                level: UserLevel::Vetter,
                locales: vec![],
            })
            .collect();
        let registry = Arc::new(UserRegistry::new(users));
        let mut db = MemoryDb::new(Arc::clone(&registry));
        db.put_value(&Locale::new("fr"), DE, "allemand", None, None)
            .unwrap();
        let state = SurveyState::init(
            SubmissionRules::default(),
            registry,
            db,
            Arc::new(CheckSet::standard(40, vec![])),
        )
        .unwrap();
        Arc::new(state)
    }

    #[test]
    fn unknown_user_is_an_error() {
        let s = state();
        let res = s.submit(
            "s1",
            UserId(99),
            &Locale::new("fr"),
            DE,
            &RowRequest::new(Choice::Confirm),
            &mut NullResultHandler,
        );
        assert!(matches!(res, Err(VettingError::UnknownUser { .. })));
    }

    #[test]
    fn concurrent_sessions_all_land() {
        let s = state();
        let handles: Vec<_> = (1..=4)
            .map(|i| {
                let s = Arc::clone(&s);
                thread::spawn(move || {
                    s.submit(
                        &format!("session-{}", i),
                        UserId(i),
                        &Locale::new("fr"),
                        DE,
                        &RowRequest::new(Choice::Confirm),
                        &mut NullResultHandler,
                    )
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().changed());
        }
        let row = s.load_row(&Locale::new("fr"), DE).unwrap();
        assert_eq!(row.items[0].votes.len(), 4);
        assert!(s.sessions.lock().unwrap().is_empty());
    }

    #[test]
    fn session_locks_are_forgotten_after_use() {
        let s = state();
        for i in 0..10 {
            s.submit(
                &format!("page-{}", i),
                UserId(1),
                &Locale::new("fr"),
                DE,
                &RowRequest::new(Choice::NoAction),
                &mut NullResultHandler,
            )
            .unwrap();
        }
        assert!(s.sessions.lock().unwrap().is_empty());

        // A lock still held elsewhere stays registered.
        let held = s.session_lock("busy").unwrap();
        let extra = s.session_lock("busy").unwrap();
        s.release_session("busy", extra).unwrap();
        assert_eq!(s.sessions.lock().unwrap().len(), 1);
        s.release_session("busy", held).unwrap();
        assert!(s.sessions.lock().unwrap().is_empty());
    }

    #[test]
    fn background_recount_resolves_winner() {
        let s = state();
        s.submit(
            "s1",
            UserId(1),
            &Locale::new("fr"),
            DE,
            &RowRequest::change_to("Allemand", None),
            &mut NullResultHandler,
        )
        .unwrap();
        s.submit(
            "s2",
            UserId(2),
            &Locale::new("fr"),
            DE,
            &RowRequest::new(Choice::parse("proposed-u1-1")),
            &mut NullResultHandler,
        )
        .unwrap();
        let report = s.schedule_recount().unwrap().recv().unwrap().unwrap();
        assert_eq!(report.implied_votes, 0);
        assert_eq!(report.results, 1);
        let row = s.load_row(&Locale::new("fr"), DE).unwrap();
        assert_eq!(
            row.winning_path,
            s.with_source(|db| db.path_id(&format!("{}[@alt=\"proposed-u1-1\"]", DE)))
                .unwrap()
        );
        s.shutdown().unwrap();
        assert!(s.schedule_recount().is_err());
    }

    #[test]
    fn section_reports_result_count() {
        let s = state();
        let mut h = JsonResultHandler::new();
        let rows = vec![(
            Locale::new("fr"),
            DE.to_string(),
            RowRequest::new(Choice::Confirm),
        )];
        assert!(s.submit_section("s1", UserId(3), &rows, &mut h).unwrap());
        assert_eq!(h.events().len(), 2);
    }
}
