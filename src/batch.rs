use log::{debug, info, warn};

use snafu::{prelude::*, ErrorCompat, Snafu};
use survey_vetting::*;

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calamine::{open_workbook, Reader, Xlsx};

use regex::Regex;
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::batch::config_reader::*;

pub mod config_reader;
mod io_common;
mod io_xlsx;

#[derive(Debug, Snafu)]
pub enum BatchError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The spreadsheet has no data"))]
    EmptyExcel {},
    #[snafu(display("Unexpected cell at line {lineno}: {content}"))]
    ExcelWrongCellType { lineno: u64, content: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Expected a number"))]
    ParsingJsonNumber {},
    #[snafu(display("Error writing the summary"))]
    WritingSummary { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Invalid path pattern {pattern}"))]
    InvalidRules {
        source: regex::Error,
        pattern: String,
    },
    #[snafu(display("Unknown user level {level} for user {id}"))]
    UnknownLevel { id: u32, level: String },
    #[snafu(display("Vetting error"))]
    Vetting { source: VettingError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type BatchResult<T> = Result<T, BatchError>;

/// The output formats of the command line.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum OutputFormat {
    Json,
    Html,
}

fn validate_rules(rules: &Option<RulesConfig>) -> BatchResult<SubmissionRules> {
    let defaults = SubmissionRules::default();
    let rules = match rules {
        Some(r) => r.clone(),
        None => return Ok(defaults),
    };
    let empty_allowed = match rules.empty_allowed_paths {
        Some(patterns) => {
            let mut res = Vec::new();
            for pattern in patterns {
                let re = Regex::new(&pattern).context(InvalidRulesSnafu {
                    pattern: pattern.clone(),
                })?;
                res.push(re);
            }
            res
        }
        None => defaults.empty_allowed,
    };
    Ok(SubmissionRules {
        empty_allowed,
        advisory_causes: rules.advisory_checks.unwrap_or(defaults.advisory_causes),
        readonly: rules.readonly.unwrap_or(defaults.readonly),
    })
}

fn validate_checks(checks: &Option<ChecksConfig>) -> BatchResult<CheckSet> {
    let checks = checks.clone().unwrap_or_default();
    Ok(CheckSet::standard(
        checks.max_value_length()?,
        checks.coverage_prefixes.unwrap_or_default(),
    ))
}

fn validate_users(users: &[UserConfig]) -> BatchResult<UserRegistry> {
    let mut res: Vec<User> = Vec::new();
    for u in users.iter() {
        let level = UserLevel::from_name(&u.level).context(UnknownLevelSnafu {
            id: u.id,
            level: u.level.clone(),
        })?;
        res.push(User {
            id: UserId(u.id),
            email: u.email.clone(),
            org: u.org.clone(),
            level,
            locales: u
                .locales
                .iter()
                .flatten()
                .map(|l| Locale::new(l))
                .collect(),
        });
    }
    Ok(UserRegistry::new(res))
}

fn read_submission_source(root_path: &Path, source: &SubmissionSource) -> BatchResult<Vec<SubmissionConfig>> {
    let p: PathBuf = root_path.join(&source.file_path);
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read submission file {:?}", p2);
    match source.provider.as_str() {
        "json" => read_json_submissions(&p2),
        "xlsx" => io_xlsx::read_xlsx_submissions(&p2, source),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

fn create_request(sub: &SubmissionConfig) -> RowRequest {
    let mut request = RowRequest::new(Choice::parse(sub.choice.as_deref().unwrap_or("")));
    request.value = sub.value.clone().unwrap_or_default();
    request.reference = sub.reference.clone().filter(|r| !r.is_empty());
    request.delete_tags = sub.delete.iter().flatten().cloned().collect();
    request.unvote_tags = sub.unvote.iter().flatten().cloned().collect();
    request
}

fn submission_js(idx: usize, sub: &SubmissionConfig, outcome: &RowOutcome, events: &[SubmissionEvent]) -> BatchResult<JSValue> {
    let events_js = serde_json::to_value(events).context(WritingSummarySnafu {})?;
    Ok(json!({
        "submission": idx + 1,
        "user": sub.user,
        "locale": sub.locale,
        "xpath": sub.xpath,
        "choice": sub.choice.clone().unwrap_or_default(),
        "changed": outcome.changed(),
        "events": events_js,
    }))
}

fn winners_js(state: &SurveyState<MemoryDb>, rows: &BTreeSet<(Locale, String)>) -> BatchResult<Vec<JSValue>> {
    state
        .with_source(|db| {
            let mut res: Vec<JSValue> = Vec::new();
            for (locale, base_xpath) in rows.iter() {
                let base = match db.path_id(base_xpath)? {
                    Some(b) => b,
                    None => continue,
                };
                let winner = db.winning_path(locale, base)?;
                let (path, value) = match winner {
                    Some(w) => {
                        let xpath = db.xpath_for(w)?;
                        let value = db.value_at(locale, &xpath)?.map(|v| v.value);
                        (Some(xpath), value)
                    }
                    None => (None, None),
                };
                res.push(json!({
                    "locale": locale,
                    "xpath": base_xpath,
                    "path": path,
                    "value": value,
                    "status": db.result_status(locale, base)?,
                }));
            }
            Ok(res)
        })
        .context(VettingSnafu {})
}

fn write_output(out: &Option<String>, text: &str) -> BatchResult<()> {
    match out.as_deref() {
        None | Some("stdout") => {
            println!("{}", text);
            Ok(())
        }
        Some(path) => {
            info!("Writing output to {}", path);
            fs::write(path, text).context(WritingOutputSnafu { path })
        }
    }
}

/// Replays the submissions of a batch configuration and checks the summary
/// against a reference, if one is given.
pub fn run_batch(
    config_path: &str,
    input: Option<(String, SubmissionSource)>,
    out: &Option<String>,
    check_summary_path: Option<String>,
    format: &str,
) -> BatchResult<()> {
    let format = match format {
        "json" => OutputFormat::Json,
        "html" => OutputFormat::Html,
        x => whatever!("Unknown output format {:?}", x),
    };
    let config_p = Path::new(config_path);
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    let rules = validate_rules(&config.rules)?;
    let checks = validate_checks(&config.checks)?;
    let registry = Arc::new(validate_users(&config.users)?);

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;
    let mut submissions: Vec<SubmissionConfig> = config.submissions.clone().unwrap_or_default();
    match input {
        // The command line overrides the sources of the configuration.
        Some((path, source)) => {
            submissions.append(&mut read_submission_source(Path::new(""), &SubmissionSource {
                file_path: path,
                ..source
            })?);
        }
        None => {
            for source in config.submission_sources.iter().flatten() {
                submissions.append(&mut read_submission_source(root_p, source)?);
            }
        }
    }
    info!("run_batch: {} submissions", submissions.len());

    // Every row touched by the batch, to report its winner.
    let mut rows: BTreeSet<(Locale, String)> = BTreeSet::new();

    let mut db = MemoryDb::new(Arc::clone(&registry));
    for d in config.data.iter().flatten() {
        let locale = Locale::new(&d.locale);
        db.put_value(
            &locale,
            &d.xpath,
            &d.value,
            d.submitter.map(UserId),
            d.reference.as_deref(),
        )
        .context(VettingSnafu {})?;
        rows.insert((locale, xpath::base_path(&d.xpath)));
    }

    let state = SurveyState::init(rules, registry, db, Arc::new(checks)).context(VettingSnafu {})?;
    let initial = state.recount().context(VettingSnafu {})?;
    debug!("run_batch: initial recount {:?}", initial);

    let mut json_handler = JsonResultHandler::new();
    let mut html_handler = HtmlResultHandler::new();
    let mut results_js: Vec<JSValue> = Vec::new();
    for (idx, sub) in submissions.iter().enumerate() {
        let locale = Locale::new(&sub.locale);
        rows.insert((locale.clone(), xpath::base_path(&sub.xpath)));
        let session = sub
            .session
            .clone()
            .unwrap_or_else(|| io_common::default_session(sub.user));
        let request = create_request(sub);
        let handler: &mut dyn ResultHandler = match format {
            OutputFormat::Json => &mut json_handler,
            OutputFormat::Html => &mut html_handler,
        };
        let outcome = state
            .submit(&session, UserId(sub.user), &locale, &sub.xpath, &request, handler)
            .context(VettingSnafu {})?;
        debug!("run_batch: submission {}: {:?}", idx + 1, outcome);
        results_js.push(submission_js(idx, sub, &outcome, &json_handler.take_events())?);
    }

    let report = state.recount().context(VettingSnafu {})?;
    let winners = winners_js(&state, &rows)?;
    state.shutdown().context(VettingSnafu {})?;

    if format == OutputFormat::Html {
        return write_output(out, html_handler.as_str());
    }

    // Assemble the final json
    let c = OutputConfig {
        batch: config.output_settings.batch_name.clone(),
    };
    let result_js = json!({
        "config": c,
        "results": results_js,
        "resultCount": report.results,
        "winners": winners,
    });
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingSummarySnafu {})?;
    let out = match out {
        Some(_) => out.clone(),
        None => config.output_settings.output_path.clone(),
    };
    write_output(&out, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingSummarySnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

/// Runs the command line.
pub fn run(args: &Args) -> BatchResult<()> {
    let input = match &args.input {
        Some(path) => {
            let provider = match args.input_type.as_deref() {
                Some(t) => t.to_string(),
                None if path.ends_with(".xlsx") => "xlsx".to_string(),
                None => "json".to_string(),
            };
            Some((
                path.clone(),
                SubmissionSource {
                    provider,
                    file_path: path.clone(),
                    excel_worksheet_name: args.excel_worksheet_name.clone(),
                },
            ))
        }
        None => None,
    };
    run_batch(
        &args.config,
        input,
        &args.out,
        args.reference.clone(),
        args.format.as_deref().unwrap_or("json"),
    )
}

fn run_batch_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let test_dir = option_env!("STVET_TEST_DIR")
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"));
    info!("Running test {}", test_name);
    let out_path = std::env::temp_dir()
        .join(format!("stvet_{}_summary.json", test_name))
        .display()
        .to_string();
    let res = run_batch(
        &format!("{}/{}/{}", test_dir, test_name, config_lpath),
        None,
        &Some(out_path),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        "json",
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        panic!("test {} failed: {}", test_name, e);
    }
}

pub fn test_wrapper(test_name: &str) {
    run_batch_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}
