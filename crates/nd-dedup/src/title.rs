//! Title normalization: exact keys, token sets and fingerprints.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[a-z0-9]{4,}").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Site-name suffix delimiters. En and em dashes are already `-` by the
/// time these are searched, so ` — ` is covered by ` - `.
const SUFFIX_DELIMITERS: &[&str] = &[" - ", " | "];

const FINGERPRINT_LEN: usize = 100;

fn typographic_map() -> Vec<(char, &'static str)> {
    vec![
        ('\u{2019}', "'"),
        ('\u{2018}', "'"),
        ('\u{201C}', "\""),
        ('\u{201D}', "\""),
        ('\u{2013}', "-"),
        ('\u{2014}', "-"),
    ]
}

fn is_quote_or_bracket(c: char) -> bool {
    matches!(c, '\'' | '"' | '`' | '(' | ')' | '[' | ']' | '{' | '}')
}

fn collapse_whitespace(s: &str) -> String {
    RE_WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Exact-match key: lowercase, straight quotes and dashes, site suffix cut,
/// quotes and brackets removed, whitespace collapsed.
pub fn normalize_title_key(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }
    let mut s = title.to_lowercase();
    for (from, to) in typographic_map() {
        s = s.replace(from, to);
    }
    let cut = SUFFIX_DELIMITERS
        .iter()
        .filter_map(|d| s.find(d))
        .min();
    if let Some(pos) = cut {
        s.truncate(pos);
    }
    let s: String = s.chars().filter(|c| !is_quote_or_bracket(*c)).collect();
    collapse_whitespace(&s)
}

/// Words of four or more ASCII letters/digits from the title key.
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    let key = normalize_title_key(title);
    RE_TOKEN
        .find_iter(&key)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Decode the handful of entities feeds actually emit and strip markup.
pub fn clean_title(title: &str) -> String {
    let decoded = title
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    RE_TAG.replace_all(&decoded, "").to_string()
}

/// First 100 characters of the title with markup and punctuation removed.
pub fn fingerprint(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }
    let cleaned = clean_title(title).to_lowercase();
    let spaced = RE_NON_WORD.replace_all(&cleaned, " ");
    collapse_whitespace(&spaced).chars().take(FINGERPRINT_LEN).collect()
}
