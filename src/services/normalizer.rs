// src/services/normalizer.rs

//! Text canonicalization for fingerprinting.
//!
//! Cosmetic variants of the same posting ("Acme, Inc." / "ACME", "Cook!!" /
//! "Cook") should normalize to identical strings so their shingles match.
//! All functions are pure and return an empty string for blank input.

use std::sync::LazyLock;

use regex::Regex;

/// Word boundary inside camelCase / PascalCase company names.
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel-case regex"));

/// Anything that is not a lowercase ascii letter, digit or whitespace.
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid punctuation regex"));

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

/// Legal/corporate suffixes stripped from the end of company names.
const COMPANY_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "llp",
    "lp",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "companies",
    "group",
    "holdings",
    "holding",
    "plc",
    "pllc",
    "pc",
    "enterprises",
];

/// Job-ad filler that carries no identity.
const TITLE_STOPWORDS: &[&str] = &[
    "urgent",
    "urgently",
    "asap",
    "immediate",
    "immediately",
    "hiring",
    "now",
    "needed",
    "wanted",
    "full",
    "part",
    "time",
    "fulltime",
    "parttime",
    "job",
    "jobs",
    "opening",
    "openings",
    "position",
    "apply",
    "today",
    "new",
    "the",
    "a",
    "an",
    "and",
    "or",
    "for",
    "to",
    "of",
    "in",
    "at",
    "with",
];

/// Spelled-out forms of 0 through 12.
const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve",
];

/// Canonicalize a company name.
pub fn normalize_company(s: &str) -> String {
    if s.trim().is_empty() {
        return String::new();
    }

    let split = CAMEL_BOUNDARY.replace_all(s, "$1 $2");
    let lowered = split.to_lowercase().replace('&', " and ");
    let cleaned = strip_punctuation(&lowered);

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    while tokens.len() > 1 && LEADING_ARTICLES.contains(&tokens[0]) {
        tokens.remove(0);
    }

    let mut tokens: Vec<String> = tokens.into_iter().map(spell_small_number).collect();

    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| COMPANY_SUFFIXES.contains(&t.as_str()))
    {
        tokens.pop();
    }

    tokens.join(" ")
}

/// Canonicalize a job title, dropping filler words.
pub fn normalize_title(s: &str) -> String {
    if s.trim().is_empty() {
        return String::new();
    }

    strip_punctuation(&s.to_lowercase())
        .split_whitespace()
        .filter(|word| !TITLE_STOPWORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize a description. No stop-word removal.
pub fn normalize_description(s: &str) -> String {
    if s.trim().is_empty() {
        return String::new();
    }

    strip_punctuation(&s.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop apostrophes, then turn remaining punctuation into spaces.
fn strip_punctuation(lowered: &str) -> String {
    let without_apostrophes: String = lowered
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .collect();
    NON_ALNUM
        .replace_all(&without_apostrophes, " ")
        .into_owned()
}

fn spell_small_number(token: &str) -> String {
    token
        .parse::<usize>()
        .ok()
        .filter(|_| token.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| NUMBER_WORDS.get(n))
        .map(|word| (*word).to_string())
        .unwrap_or_else(|| token.to_string())
}
