use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static INVALID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DASHES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

const PROVINCE_PREFIXES: &[&str] = &[
    "province de ",
    "province d'",
    "prefecture de ",
    "prefecture d'",
    "prefecture of ",
    "province of ",
];
const PROVINCE_SUFFIXES: &[&str] = &[" province", " prefecture"];

/// Lowercase, hyphen-separated identifier. Accents are folded to their
/// base letter; anything else outside `[a-z0-9 -]` is dropped.
pub fn slugify(name: &str) -> String {
    let folded = fold_accents(name).to_lowercase();
    let s = INVALID_RE.replace_all(&folded, "");
    let s = SPACE_RE.replace_all(s.trim(), "-");
    let s = DASHES_RE.replace_all(&s, "-");
    s.trim_matches('-').to_string()
}

/// Turn an administrative name such as "Province de Taroudant" into a
/// region id (`province/taroudant`).
pub fn province_id_from_name(name: &str) -> String {
    let mut s = fold_accents(name).to_lowercase();
    for prefix in PROVINCE_PREFIXES {
        s = s.replace(prefix, "");
    }
    for suffix in PROVINCE_SUFFIXES {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
        }
    }
    province_id(&slugify(&s))
}

/// Prefix `province/` unless the id already carries it.
pub fn province_id(id: &str) -> String {
    if id.starts_with("province/") {
        id.to_string()
    } else {
        format!("province/{}", id)
    }
}

/// Last path segment of a region id: `province/al-haouz` → `al-haouz`.
pub fn province_slug(province: &str) -> &str {
    province.rsplit('/').next().unwrap_or(province)
}

fn fold_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}
