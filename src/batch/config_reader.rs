use crate::batch::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "batchName")]
    pub batch_name: String,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub batch: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    #[serde(rename = "emptyAllowedPaths")]
    pub empty_allowed_paths: Option<Vec<String>>,
    #[serde(rename = "advisoryChecks")]
    pub advisory_checks: Option<Vec<String>>,
    pub readonly: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChecksConfig {
    #[serde(rename = "maxValueLength")]
    pub max_value_length: Option<JSValue>,
    #[serde(rename = "coveragePrefixes")]
    pub coverage_prefixes: Option<Vec<String>>,
}

impl ChecksConfig {
    pub const DEFAULT_MAX_VALUE_LENGTH: usize = 200;

    pub fn max_value_length(&self) -> BatchResult<usize> {
        match &self.max_value_length {
            None => Ok(ChecksConfig::DEFAULT_MAX_VALUE_LENGTH),
            x => read_js_int(x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: u32,
    pub email: String,
    pub org: String,
    pub level: String,
    pub locales: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub locale: String,
    pub xpath: String,
    pub value: String,
    pub submitter: Option<u32>,
    pub reference: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

/// One posted row, as read from the configuration or an input file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub user: u32,
    pub session: Option<String>,
    pub locale: String,
    pub xpath: String,
    pub choice: Option<String>,
    pub value: Option<String>,
    pub reference: Option<String>,
    pub delete: Option<Vec<String>>,
    pub unvote: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub rules: Option<RulesConfig>,
    pub checks: Option<ChecksConfig>,
    pub users: Vec<UserConfig>,
    pub data: Option<Vec<DataConfig>>,
    #[serde(rename = "submissionSources")]
    pub submission_sources: Option<Vec<SubmissionSource>>,
    pub submissions: Option<Vec<SubmissionConfig>>,
}

pub fn read_config(path: &str) -> BatchResult<BatchConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: BatchConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

pub fn read_summary(path: &str) -> BatchResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_summary: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

pub fn read_json_submissions(path: &str) -> BatchResult<Vec<SubmissionConfig>> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let res: Vec<SubmissionConfig> =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    Ok(res)
}

fn read_js_int(x: &Option<JSValue>) -> BatchResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}
