//! Issue-date extraction.

use chrono::NaiveDate;

use crate::fields::{CandidateField, FieldKind, FieldValue};

use super::patterns::{DATE_DMY, DATE_SHORT_YEAR, DATE_YMD, ISSUE_DATE_LABEL};
use super::JoinedText;

const LABELED_WEIGHT: f32 = 0.95;
const UNLABELED_WEIGHT: f32 = 0.9;
// A two-digit year cannot be resolved to a century; the candidate is
// kept raw-only so the validator can flag it for review.
const SHORT_YEAR_WEIGHT: f32 = 0.4;

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    let mut candidates = Vec::new();

    for caps in DATE_DMY.captures_iter(text.text()) {
        let Some(whole) = caps.get(0) else { continue };
        let parsed = ymd(&caps[3], &caps[2], &caps[1]);
        candidates.push(candidate(text, attempt, whole.start(), whole.end(), parsed));
    }

    for caps in DATE_YMD.captures_iter(text.text()) {
        let Some(whole) = caps.get(0) else { continue };
        let parsed = ymd(&caps[1], &caps[2], &caps[3]);
        candidates.push(candidate(text, attempt, whole.start(), whole.end(), parsed));
    }

    for m in DATE_SHORT_YEAR.find_iter(text.text()) {
        let confidence = text
            .token_confidence(m.start(), m.end())
            .scale(SHORT_YEAR_WEIGHT);
        candidates.push(CandidateField::unparsed(
            FieldKind::IssueDate,
            m.as_str(),
            confidence,
            attempt,
        ));
    }

    candidates
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year = year.parse().ok()?;
    let month = month.parse().ok()?;
    let day = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn candidate(
    text: &JoinedText,
    attempt: usize,
    start: usize,
    end: usize,
    parsed: Option<NaiveDate>,
) -> CandidateField {
    let labeled = ISSUE_DATE_LABEL.is_match(text.line_at(start))
        || ISSUE_DATE_LABEL.is_match(text.context_before(start, 40));
    let weight = if labeled { LABELED_WEIGHT } else { UNLABELED_WEIGHT };
    let raw = &text.text()[start..end];
    let confidence = text.token_confidence(start, end).scale(weight);

    match parsed {
        Some(date) => CandidateField::new(
            FieldKind::IssueDate,
            raw,
            FieldValue::Date(date),
            confidence,
            attempt,
        ),
        // Matched the date shape but is not a calendar date (e.g.
        // 45.13.2024 from a misread).
        None => CandidateField::unparsed(FieldKind::IssueDate, raw, confidence, attempt),
    }
}
