//! Small helpers shared across the pipeline: counter and date parsing,
//! log-friendly truncation, slugs for artifact names, and output directory
//! checks.

use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Parse a counter as the dashboard renders it.
///
/// Accepts thousands separators and `k`/`m` suffixes (`"1.2k"` -> 1200,
/// `"3M"` -> 3000000). Anything unreadable counts as zero: a missing or odd
/// counter is not an extraction failure.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_count("1,234"), 1234);
/// assert_eq!(parse_count("1.2k"), 1200);
/// assert_eq!(parse_count("-"), 0);
/// ```
pub fn parse_count(text: &str) -> u64 {
    let cleaned = text.trim().to_lowercase().replace(',', "");
    let (digits, multiplier) = if let Some(rest) = cleaned.strip_suffix('k') {
        (rest, 1_000.0)
    } else if let Some(rest) = cleaned.strip_suffix('m') {
        (rest, 1_000_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    match digits.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

/// Year-first dates: `2023年4月1日`, `2023/4/1`, `2023-04-01`.
static YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*[年/\-.]\s*(\d{1,2})\s*[月/\-.]\s*(\d{1,2})").expect("static pattern")
});

/// `4月1日, 2023` as shown on some article pages.
static MDY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})月\s*(\d{1,2})日,?\s*(\d{4})").expect("static pattern"));

/// Parse a publish date as the dashboard or an article page shows it.
///
/// Relative dates ("3日前") and impossible days give `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let number = |caps: &regex::Captures<'_>, i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    if let Some(caps) = YMD.captures(text) {
        let year = i32::try_from(number(&caps, 1)?).ok()?;
        return NaiveDate::from_ymd_opt(year, number(&caps, 2)?, number(&caps, 3)?);
    }
    let caps = MDY.captures(text)?;
    let year = i32::try_from(number(&caps, 3)?).ok()?;
    NaiveDate::from_ymd_opt(year, number(&caps, 1)?, number(&caps, 2)?)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary near `max` bytes and get a
/// `"…(+N bytes)"` marker appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert free text into a file-name friendly slug.
///
/// ```ignore
/// assert_eq!(slugify("navigate https://note.com/login"), "navigate-httpsnotecomlogin");
/// ```
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-' && c != '_', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    truncate_chars(&slug, 64)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Timestamp used in artifact file names, e.g. `20250506_203000`.
pub fn file_stamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_count_plain_and_separated() {
        assert_eq!(parse_count("42"), 42);
        assert_eq!(parse_count(" 1,234 "), 1234);
    }

    #[test]
    fn test_parse_count_suffixes() {
        assert_eq!(parse_count("1.2k"), 1200);
        assert_eq!(parse_count("3M"), 3_000_000);
        assert_eq!(parse_count("12K"), 12_000);
    }

    #[test]
    fn test_parse_count_garbage_is_zero() {
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("-"), 0);
        assert_eq!(parse_count("views"), 0);
        assert_eq!(parse_count("-5"), 0);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let s = "あいうえお";
        let result = truncate_for_log(s, 4);
        assert!(result.starts_with("あ…"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Login Failed"), "login-failed");
        assert_eq!(
            slugify("navigate https://note.com/login"),
            "navigate-httpsnotecomlogin"
        );
        assert_eq!(slugify("list_unavailable"), "list_unavailable");
    }

    #[test]
    fn test_file_stamp() {
        let at = Local.with_ymd_and_hms(2025, 5, 6, 20, 30, 0).unwrap();
        assert_eq!(file_stamp(at), "20250506_203000");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__write_check__").exists());
    }

    #[test]
    fn test_parse_date_formats() {
        let april_first = NaiveDate::from_ymd_opt(2023, 4, 1);
        assert_eq!(parse_date("2023年4月1日"), april_first);
        assert_eq!(parse_date("2023年04月01日 12:30"), april_first);
        assert_eq!(parse_date("2023/4/1"), april_first);
        assert_eq!(parse_date("2023-04-01"), april_first);
        assert_eq!(parse_date("公開日 2023.4.1"), april_first);
        assert_eq!(parse_date("4月1日, 2023"), april_first);
    }

    #[test]
    fn test_parse_date_rejects_relative_and_impossible() {
        assert_eq!(parse_date("3日前"), None);
        assert_eq!(parse_date("2023年2月30日"), None);
        assert_eq!(parse_date(""), None);
    }
}
