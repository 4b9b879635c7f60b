use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static YYYYMMDD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{8}$").unwrap());
static YYMMDD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{6}$").unwrap());

/// Oldest year a filename date may carry.
pub const MIN_YEAR: i32 = 1990;

struct StemRule {
    /// Pick the candidate date text out of a file stem.
    candidate: fn(&str) -> Option<&str>,
    regex: &'static LazyLock<Regex>,
    format: &'static str,
}

/// `IMG_YYYYMMDD_...` / `MOV_YYYYMMDD_...`
fn camera_prefix(stem: &str) -> Option<&str> {
    if stem.starts_with("IMG_") || stem.starts_with("MOV_") {
        stem.split('_').nth(1)
    } else {
        None
    }
}

/// `FILEYYMMDD...`
fn file_prefix(stem: &str) -> Option<&str> {
    if stem.starts_with("FILE") {
        stem.get(4..10)
    } else {
        None
    }
}

/// `YYYYMMDD...` on stems longer than 8 characters
fn leading_date(stem: &str) -> Option<&str> {
    if stem.chars().count() > 8 {
        stem.get(..8)
    } else {
        None
    }
}

// Order matters: the first rule yielding a valid date wins.
static RULES: &[StemRule] = &[
    StemRule { candidate: camera_prefix, regex: &YYYYMMDD_RE, format: "%Y%m%d" },
    StemRule { candidate: file_prefix, regex: &YYMMDD_RE, format: "%y%m%d" },
    StemRule { candidate: leading_date, regex: &YYYYMMDD_RE, format: "%Y%m%d" },
];

/// Guess the capture date from a file stem (file name without extension).
pub fn guess_date_from_stem(stem: &str) -> Option<NaiveDateTime> {
    guess_with_max_year(stem, Local::now().year())
}

pub(crate) fn guess_with_max_year(stem: &str, max_year: i32) -> Option<NaiveDateTime> {
    for rule in RULES {
        let Some(text) = (rule.candidate)(stem) else {
            continue;
        };
        if !rule.regex.is_match(text) {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(text, rule.format) else {
            continue;
        };
        if (MIN_YEAR..=max_year).contains(&date.year()) {
            log::debug!("Guessed date {} from \"{}\"", date, stem);
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}
