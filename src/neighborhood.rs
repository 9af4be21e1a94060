//! Neighborhood name normalization, fuzzy similarity and extraction from
//! free-text Bulgarian addresses.
//!
//! Three forms of a name are used here:
//! - *surface*: lowercased, prefix/block/entrance/quote noise removed, but a
//!   trailing sub-district number kept ("люлин 9");
//! - *base*: the surface without its trailing number ("люлин");
//! - *canonical key*: the base mapped through the alias table. This is what
//!   gets stored on listings and compared for equality.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical key → every accepted spelling (Cyrillic and Latin).
const ALIASES: &[(&str, &[&str])] = &[
    // Sofia
    ("люлин", &["люлин", "lyulin"]),
    ("младост", &["младост", "mladost"]),
    ("лозенец", &["лозенец", "lozenec", "lozenets"]),
    ("дружба", &["дружба", "druzhba"]),
    ("надежда", &["надежда", "nadezhda"]),
    ("красно село", &["красно село", "krasno selo"]),
    ("студентски", &["студентски", "studentski"]),
    ("овча купел", &["овча купел", "ovcha kupel"]),
    ("витоша", &["витоша", "vitosha"]),
    ("банишора", &["банишора", "banishora"]),
    ("хиподрума", &["хиподрума", "hipodruma"]),
    ("илинден", &["илинден", "ilinden"]),
    ("подуяне", &["подуяне", "poduyane"]),
    ("хаджи димитър", &["хаджи димитър", "hadji dimitar"]),
    ("център", &["център", "center", "centar"]),
    // Plovdiv
    ("тракия", &["тракия", "trakia"]),
    ("кючук париж", &["кючук париж", "kyuchuk parizh"]),
    ("смирненски", &["смирненски", "smirnenski"]),
    // Varna
    ("чайка", &["чайка", "chaika"]),
    ("владиславово", &["владиславово", "vladislavovo"]),
    ("левски", &["левски", "levski"]),
    // Black Sea resorts
    ("слънчев бряг", &["слънчев бряг", "sunny beach"]),
    ("несебър", &["несебър", "nessebar"]),
    ("равда", &["равда", "ravda"]),
    ("свети влас", &["свети влас", "sveti vlas"]),
];

static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:квартал|местност|район|ж\.?\s*к\.?|кв(?:\.|\s))\s*").unwrap()
});
static BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*бл\.?\s*\d+\S*").unwrap());
static ENTRANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*вх\.?\s*[\p{Cyrillic}a-z]\b").unwrap());
static TRAILING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]*\d+$").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Address patterns, most specific first. Each captures the district name.
static ADDRESS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"ж\.?\s*к\.?\s*["'„“]?([\p{Cyrillic}\s\d-]+)"#,
        r#"квартал\s*["'„“]?([\p{Cyrillic}\s-]+)"#,
        r#"кв\.\s*["'„“]?([\p{Cyrillic}\s\d-]+)"#,
        r#"район\s*["'„“]?([\p{Cyrillic}\s-]+)"#,
        r#"местност\s*["'„“]?([\p{Cyrillic}\s-]+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn surface(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let s = PREFIX.replace(&lower, "");
    let s = BLOCK.replace_all(&s, "");
    let s = ENTRANCE.replace_all(&s, "");
    let s: String = s
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '„' | '“' | '”'))
        .collect();
    let s = s.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '.');
    WHITESPACE.replace_all(s, " ").into_owned()
}

fn base(surface: &str) -> &str {
    match TRAILING_NUMBER.find(surface) {
        Some(m) => surface[..m.start()].trim_end(),
        None => surface,
    }
}

/// Alias entry whose spelling list contains `base` exactly.
fn alias_entry(base: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(_, spellings)| spellings.contains(&base))
        .map(|(canonical, _)| *canonical)
}

fn canonical(base: &str) -> String {
    alias_entry(base).map_or_else(|| base.to_string(), str::to_string)
}

/// Canonical neighborhood key, or `None` when nothing meaningful remains.
pub fn normalize(raw: &str) -> Option<String> {
    let s = surface(raw);
    let b = base(&s);
    if b.is_empty() {
        return None;
    }
    Some(canonical(b))
}

/// Similarity of two raw neighborhood names in `[0, 1]`. Symmetric.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (sa, sb) = (surface(a), surface(b));
    let (ba, bb) = (base(&sa), base(&sb));
    if ba.is_empty() || bb.is_empty() {
        return 0.0;
    }
    if sa == sb {
        return 1.0;
    }
    if ba != bb {
        if let (Some(ka), Some(kb)) = (alias_entry(ba), alias_entry(bb)) {
            if ka == kb {
                return 0.9;
            }
        }
    }
    if ba.contains(bb) || bb.contains(ba) {
        return 0.8;
    }

    let (la, lb) = (ba.chars().count(), bb.chars().count());
    let min_len = la.min(lb);
    if min_len >= 3 {
        let common = ba.chars().zip(bb.chars()).take_while(|(x, y)| x == y).count();
        if common >= 3 {
            return 0.5 * common as f64 / min_len as f64;
        }
    }
    0.0
}

/// Pull the district out of an address such as
/// `гр. София, ж.к. "Люлин 9", бл. 123` and normalize it.
pub fn extract_neighborhood(address: &str) -> Option<String> {
    let lower = address.to_lowercase();
    ADDRESS_PATTERNS
        .iter()
        .find_map(|re| re.captures(&lower))
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize(m.as_str()))
}
