use std::path::Path;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Splits a `;`-separated list of item tags, dropping the empty ones.
pub fn split_tags(s: &str) -> Vec<String> {
    s.split(';')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Session used for a submission that does not name one: one per user.
pub fn default_session(user: u32) -> String {
    format!("batch-u{}", user)
}
