//! Extraction helpers both chambers use: the detail page header and
//! counters, and the date, number and URL coercions.

use crate::dom::{self, DomNode};
use crate::fetch::Page;
use crate::model::{VoteRow, VotingDetail, VotingSummary};
use chrono::{DateTime, NaiveDate, SecondsFormat};
use url::Url;

const HEADER: &str = ".container-fluid > div:first-child > div.row:first-child h5";
const PRESIDENT: &str = ".white-box #custom-share h4 > b";
const DOCUMENT: &str = ".white-box div:nth-child(3) h5 a";

fn count_selector(column: usize) -> String {
    format!(".white-box div:nth-child(3) > div.row > div:nth-child({column}) > ul > h3")
}

/// Read the detail header and counters. Also returns the names of the
/// fields that were not on the page.
pub fn parse_detail(doc: &DomNode, page_url: &Url) -> (VotingDetail, Vec<&'static str>) {
    let mut detail = VotingDetail::default();
    let mut missing = Vec::new();

    match doc.select_text(HEADER) {
        Some(header) => {
            // "Período 137 - Reunión 5 - Acta 12"
            let mut segments = header.split(" - ").map(numeric_suffix);
            detail.period = segments.next().flatten();
            detail.meeting = segments.next().flatten();
            detail.record = segments.next().flatten();
        }
        None => missing.push("header"),
    }
    for (name, value) in [
        ("period", detail.period),
        ("meeting", detail.meeting),
        ("record", detail.record),
    ] {
        if value.is_none() && !missing.contains(&"header") {
            missing.push(name);
        }
    }

    detail.president = doc
        .select_text(PRESIDENT)
        .map(|t| dom::normalize_whitespace(&t))
        .filter(|t| !t.is_empty());
    if detail.president.is_none() {
        missing.push("president");
    }

    detail.document_url = doc
        .select_attr(DOCUMENT, "href")
        .map(|href| absolute(page_url, &href));
    if detail.document_url.is_none() {
        missing.push("documentUrl");
    }

    let counts = [
        ("affirmativeCount", &mut detail.affirmative_count),
        ("negativeCount", &mut detail.negative_count),
        ("abstentionCount", &mut detail.abstention_count),
        ("absentCount", &mut detail.absent_count),
    ];
    for (column, (name, slot)) in counts.into_iter().enumerate() {
        *slot = doc
            .select_text(&count_selector(column + 1))
            .and_then(|t| parse_count(&t));
        if slot.is_none() {
            missing.push(name);
        }
    }

    (detail, missing)
}

/// Warn when scraped rows disagree with the page counters.
pub fn log_count_mismatches(voting: &VotingSummary, rows: &[VoteRow]) {
    let mismatches = voting.count_mismatches(rows);
    if !mismatches.is_empty() {
        tracing::warn!(
            voting = voting.id,
            rows = rows.len(),
            fields = ?mismatches,
            "vote rows disagree with the page counters"
        );
    }
}

/// The number ending a header segment: "Reunión 5" gives 5.
pub fn numeric_suffix(segment: &str) -> Option<u32> {
    segment.split_whitespace().last()?.parse().ok()
}

/// A counter as shown on the page, ignoring separators ("1.234" gives 1234).
pub fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Resolve `href` against the page it appeared on.
pub fn absolute(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}

/// The URL the page ended up on after redirects, for resolving its links.
pub fn page_base(page: &Page, fallback: &Url) -> Url {
    page.url()
        .and_then(|u| Url::parse(u).ok())
        .unwrap_or_else(|| fallback.clone())
}

/// Last numeric path segment of a link: `/votacion/123` gives 123.
pub fn id_from_path(href: &str) -> Option<u64> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/')
        .find(|s| !s.is_empty())?
        .parse()
        .ok()
}

/// Epoch seconds to an ISO-8601 UTC timestamp.
pub fn iso_from_epoch(raw: &str) -> Option<String> {
    let secs: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0).map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// A `YYYYMMDD` date to an ISO-8601 UTC timestamp at midnight.
pub fn iso_from_compact_date(raw: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(midnight.to_rfc3339_opts(SecondsFormat::Millis, true))
}
