//! Canonicalization of the time strings accepted by the booking API.
//!
//! Slot times arrive in several shapes depending on the caller: bare
//! "HH:MM", "HH:MM:SS" as stored by schedule configuration, or a full ISO
//! date-time that may carry a timezone offset. All comparison happens on
//! the canonical "HH:MM" form; storage uses "HH:MM:SS".

use once_cell::sync::Lazy;
use regex::Regex;

static HHMM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}(:\d{2})?$").unwrap());
static OFFSET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(Z|[+-]\d{2}:?\d{2})$").unwrap());

/// Canonical "HH:MM" comparison form.
///
/// Total: unrecognized input degrades to a best-effort prefix instead of
/// erroring, so resolution downstream reports "no such time" rather than
/// failing the whole request.
pub fn normalize_hhmm(raw: &str) -> String {
    let trimmed = raw.trim();

    // An ISO date-time keeps only its time-of-day portion.
    let time_part = match trimmed.find(['T', ' ']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    };

    let without_offset = OFFSET_RE.replace(time_part, "");

    truncate_chars(without_offset.trim(), 5)
}

/// Canonical "HH:MM:SS" storage form, seconds zero-padded.
pub fn normalize_start_time(raw: &str) -> String {
    let hhmm = normalize_hhmm(raw);
    if HHMM_RE.is_match(&hhmm) {
        format!("{}:00", hhmm)
    } else {
        hhmm
    }
}

/// Date portion of a bare date or ISO timestamp.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.find(['T', ' ']) {
        Some(idx) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hhmm_passes_through() {
        assert_eq!(normalize_hhmm("10:00"), "10:00");
    }

    #[test]
    fn seconds_are_dropped_for_comparison() {
        assert_eq!(normalize_hhmm("10:00:00"), "10:00");
    }

    #[test]
    fn iso_datetime_with_offset() {
        assert_eq!(normalize_hhmm("2024-01-01T10:00:00+00:00"), "10:00");
        assert_eq!(normalize_hhmm("2024-01-01T10:00:00-06:00"), "10:00");
        assert_eq!(normalize_hhmm("2024-01-01T10:00:00Z"), "10:00");
    }

    #[test]
    fn space_separated_datetime() {
        assert_eq!(normalize_hhmm("2024-01-01 10:30:00"), "10:30");
    }

    #[test]
    fn stored_time_with_offset() {
        assert_eq!(normalize_hhmm("10:00:00+00:00"), "10:00");
    }

    #[test]
    fn compact_offset_is_stripped() {
        assert_eq!(normalize_hhmm("10:00:00+0000"), "10:00");
    }

    #[test]
    fn unrecognized_input_degrades_to_prefix() {
        assert_eq!(normalize_hhmm("whatever"), "whate");
        assert_eq!(normalize_hhmm("ten"), "ten");
        assert_eq!(normalize_hhmm(""), "");
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert_eq!(normalize_hhmm("ééééééé"), "ééééé");
    }

    #[test]
    fn storage_form_pads_seconds() {
        assert_eq!(normalize_start_time("10:00"), "10:00:00");
        assert_eq!(normalize_start_time("10:00:30"), "10:00:00");
        assert_eq!(normalize_start_time("2024-01-01T09:15:00Z"), "09:15:00");
    }

    #[test]
    fn storage_form_leaves_junk_alone() {
        assert_eq!(normalize_start_time("junk!"), "junk!");
    }

    #[test]
    fn date_truncates_at_separator() {
        assert_eq!(normalize_date("2024-03-15"), "2024-03-15");
        assert_eq!(normalize_date("2024-03-15T10:00:00Z"), "2024-03-15");
        assert_eq!(normalize_date("2024-03-15 10:00:00"), "2024-03-15");
    }
}
