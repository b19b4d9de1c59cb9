use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::links;
use crate::model::{Link, NO_DESCRIPTION};

static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Keys lifted out of the description into structured fields.
pub const FIELD_KEYS: &[&str] = &[
    "built",
    "height",
    "width",
    "area",
    "capacity",
    "founded",
    "architect",
    "style",
    "period",
];

/// Keys whose value is plain description text.
const DESCRIPTION_KEYS: &[&str] = &["description", "desc", "about"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinedText {
    pub description: String,
    pub links: Vec<Link>,
    pub fields: BTreeMap<String, String>,
}

/// Split a free-text description into cleaned text, links and fields.
pub fn mine(raw: &str) -> MinedText {
    let text = BREAK_RE.replace_all(raw, "\n");
    let mut kept: Vec<String> = Vec::new();
    let mut links: Vec<Link> = Vec::new();
    let mut fields = BTreeMap::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for clause in split_clauses(line) {
            mine_clause(clause, &mut kept, &mut links, &mut fields);
        }
    }

    let joined = collapse(&kept.join(" "));
    MinedText {
        description: if joined.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            joined
        },
        links,
        fields,
    }
}

fn mine_clause(
    clause: &str,
    kept: &mut Vec<String>,
    links: &mut Vec<Link>,
    fields: &mut BTreeMap<String, String>,
) {
    let mut clause = clause.to_string();
    let has_url = URL_RE.is_match(&clause);

    // ── Key: value ──
    if let Some((key, value)) = split_key_value(&clause) {
        if FIELD_KEYS.contains(&key.as_str()) && !has_url {
            fields.insert(key, clean_value(&value));
            return;
        }
        if DESCRIPTION_KEYS.contains(&key.as_str()) {
            clause = value;
        }
    }

    if !URL_RE.is_match(&clause) {
        if !clause.is_empty() {
            kept.push(clause);
        }
        return;
    }

    // ── Links: one per URL occurrence ──
    let remaining = strip_separators(&collapse(&URL_RE.replace_all(&clause, " ")));
    for m in URL_RE.find_iter(&clause) {
        let url = m.as_str().to_string();
        links.push(Link {
            title: if remaining.is_empty() {
                url.clone()
            } else {
                remaining.clone()
            },
            link_type: links::classify(&url),
            url,
        });
    }
    if !remaining.is_empty() {
        kept.push(remaining);
    }
}

fn split_key_value(clause: &str) -> Option<(String, String)> {
    if clause.starts_with("http") {
        return None;
    }
    let (key, value) = clause.split_once(':')?;
    let key = key.trim().to_lowercase().replace(' ', "_");
    Some((key, value.trim().to_string()))
}

fn clean_value(value: &str) -> String {
    value.trim_end_matches(['.', ';', ',']).trim().to_string()
}

fn strip_separators(s: &str) -> String {
    s.trim().trim_end_matches([':', '-']).trim().to_string()
}

fn collapse(s: &str) -> String {
    SPACE_RE.replace_all(s.trim(), " ").to_string()
}

/// Split a line at sentence boundaries: `.`, `!` or `?` followed by
/// whitespace and an uppercase letter.
fn split_clauses(line: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = line.char_indices().collect();

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut j = i + 1;
        let mut saw_space = false;
        while j < chars.len() && chars[j].1.is_whitespace() {
            saw_space = true;
            j += 1;
        }
        if saw_space && j < chars.len() && chars[j].1.is_uppercase() {
            let end = pos + c.len_utf8();
            clauses.push(line[start..end].trim());
            start = chars[j].0;
        }
    }
    if start < line.len() {
        clauses.push(line[start..].trim());
    }
    clauses.retain(|c| !c.is_empty());
    clauses
}
