//! Helpers for the `alt` and `draft` qualifiers of xpaths.

const ALT: &str = "alt";
const DRAFT: &str = "draft";
const PROPOSED: &str = "proposed";

/// One `[@name="value"]` attribute found in an xpath, with its byte span.
#[derive(Eq, PartialEq, Debug, Clone)]
struct Attribute<'a> {
    name: &'a str,
    value: &'a str,
    start: usize,
    end: usize,
}

fn attributes(xpath: &str) -> Vec<Attribute<'_>> {
    let mut res = Vec::new();
    let mut pos = 0;
    while let Some(rel) = xpath[pos..].find("[@") {
        let start = pos + rel;
        let Some(eq_rel) = xpath[start..].find("=\"") else {
            break;
        };
        let name_end = start + eq_rel;
        let value_start = name_end + 2;
        let Some(close_rel) = xpath[value_start..].find("\"]") else {
            break;
        };
        let value_end = value_start + close_rel;
        res.push(Attribute {
            name: &xpath[start + 2..name_end],
            value: &xpath[value_start..value_end],
            start,
            end: value_end + 2,
        });
        pos = value_end + 2;
    }
    res
}

/// Splits an alt value into its type and its proposed part:
/// `variant-proposed-u4-1` gives `(Some("variant"), Some("proposed-u4-1"))`.
pub fn parse_alt(alt: &str) -> (Option<&str>, Option<&str>) {
    if alt.starts_with(PROPOSED) {
        return (None, Some(alt));
    }
    match alt.find("-proposed") {
        Some(idx) => (Some(&alt[..idx]), Some(&alt[idx + 1..])),
        None if alt.is_empty() => (None, None),
        None => (Some(alt), None),
    }
}

/// The path with draft markers and proposed alternates removed.
pub fn base_path(xpath: &str) -> String {
    let mut res = String::with_capacity(xpath.len());
    let mut last = 0;
    for attr in attributes(xpath) {
        res.push_str(&xpath[last..attr.start]);
        if attr.name == ALT {
            if let (Some(alt_type), _) = parse_alt(attr.value) {
                res.push_str(&format!("[@alt=\"{}\"]", alt_type));
            }
        } else if attr.name != DRAFT {
            res.push_str(&xpath[attr.start..attr.end]);
        }
        last = attr.end;
    }
    res.push_str(&xpath[last..]);
    res
}

/// The proposed part of the alt attribute, if any.
pub fn alt_proposed(xpath: &str) -> Option<String> {
    attributes(xpath)
        .iter()
        .filter(|a| a.name == ALT)
        .find_map(|a| parse_alt(a.value).1.map(|s| s.to_string()))
}

/// Adds a proposed alternate to a base path, keeping an existing alt type.
pub fn with_proposed_alt(base: &str, proposed: &str) -> String {
    let attrs = attributes(base);
    match attrs.iter().rev().find(|a| a.name == ALT) {
        Some(a) => format!(
            "{}[@alt=\"{}-{}\"]{}",
            &base[..a.start],
            a.value,
            proposed,
            &base[a.end..]
        ),
        None => format!("{}[@alt=\"{}\"]", base, proposed),
    }
}

/// Tag for the `n`th value proposed by a user on one path.
pub fn proposed_tag(user: u32, n: u32) -> String {
    format!("{}-u{}-{}", PROPOSED, user, n)
}
