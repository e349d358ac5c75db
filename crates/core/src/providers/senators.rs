//! Upper chamber (senado.gov.ar): a searchable, paginated listing and an
//! in-page vote table on every detail page.

use super::{dedupe, shared, ScrapeContext, Scraper};
use crate::dom::{self, DomNode};
use crate::error::{Error, Result};
use crate::fetch::{FetchError, Page};
use crate::model::{VoteRow, VotingDetail, VotingSummary};
use crate::outcome::{SkipReason, Step};
use std::collections::HashSet;
use url::Url;

const LISTING_PATH: &str = "/votaciones/actas";
const DETAIL_PATH: &str = "/votaciones/detalleActa/";
const YEAR_SELECT: &str = "select#busqueda_actas_anio";
const SEARCH_BUTTON: &str = r#"input[title="Realizar Búsqueda"]"#;
const PAGE_SIZE_SELECT: &str = "select[name=actasTable_length]";
const PAGE_SIZE: &str = "100";
const ROWS: &str = "#actasTable > tbody > tr";
const NEXT_PAGE: &str = "#actasTable_next";
const VOTES_SIZE_SELECT: &str = "select[name=detalleActaTable_length]";
const VOTE_ROWS: &str = "#detalleActaTable > tbody > tr";
const MAX_PAGES: usize = 200;

/// Extract the voting rows of one listing page.
pub fn parse_listing_page(doc: &DomNode, base: &Url) -> Vec<VotingSummary> {
    doc.select(ROWS)
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match parse_row(row, base) {
            Ok(voting) => Some(voting),
            Err(reason) => {
                tracing::warn!(row = index + 1, %reason, "listing row skipped");
                None
            }
        })
        .collect()
}

fn parse_row(row: &DomNode, base: &Url) -> Result<VotingSummary, SkipReason> {
    let cell = |n: usize| row.select_first(&format!("td:nth-child({n})"));
    let cell_text = |n: usize| {
        cell(n)
            .map(|td| td.text_content())
            .unwrap_or_default()
    };
    let link = |n: usize| row.select_attr(&format!("td:nth-child({n}) > a[href]"), "href");

    // 7. Detail link, which also carries the id
    let details_href = link(7).ok_or(SkipReason::MissingField("detailsUrl"))?;
    let id = shared::id_from_path(&details_href).ok_or(SkipReason::MissingField("id"))?;

    // 3. Title, with the file toggles removed
    let title = cell(3)
        .map(|td| clean_title(&td.text_content()))
        .unwrap_or_default();

    // 5. Result, inside a badge div on current versions of the site
    let result = row
        .select_text("td:nth-child(5) > div")
        .map(|t| dom::normalize_whitespace(&t))
        .unwrap_or_else(|| cell_text(5));

    let mut voting = VotingSummary::new(id, title, cell_text(4), result);
    // 1. Session date, YYYYMMDD
    voting.date = row
        .select_text("td:nth-child(1) > span")
        .and_then(|raw| shared::iso_from_compact_date(&raw));
    // 2. Record number
    voting.record = cell_text(2).parse().ok();
    voting.file_url = row
        .select_attr("td:nth-child(3) div > a[href]", "href")
        .map(|href| shared::absolute(base, &href));
    voting.record_url = link(6).map(|href| shared::absolute(base, &href));
    voting.details_url = Some(shared::absolute(base, &details_href));
    voting.video_url = link(8).map(|href| shared::absolute(base, &href));
    Ok(voting)
}

/// "O.D. 1/2019,\n Art. 4,  Art. 5 Ver Expedientes" gives
/// "O.D. 1/2019, Art. 4, Art. 5".
fn clean_title(text: &str) -> String {
    text.replace("Ocultar Expedientes", "")
        .replace("Ver Expedientes", "")
        .split(',')
        .map(dom::normalize_whitespace)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the "next page" control leads, or `None` on the last page.
pub fn next_page_href(doc: &DomNode) -> Option<String> {
    let next = doc.select_first(NEXT_PAGE)?;
    if next.has_class("disabled") {
        return None;
    }
    let href = next
        .get_attr("href")
        .map(|h| h.to_string())
        .or_else(|| next.select_attr("a[href]", "href"))?;
    if crate::fetch::is_inert_href(&href) {
        return None;
    }
    Some(href)
}

/// Extract the per-senator rows of a detail page.
pub fn parse_vote_rows(doc: &DomNode, base: &Url, voting: &VotingSummary) -> Vec<VoteRow> {
    doc.select(VOTE_ROWS)
        .into_iter()
        .filter_map(|row| {
            let cell_text = |n: usize| {
                row.select_first(&format!("td:nth-child({n})"))
                    .map(|td| td.text_content())
                    .unwrap_or_default()
            };
            let profile_href = row.select_attr("td:nth-child(2) a[href]", "href");
            let legislator = row
                .select_text("td:nth-child(2) a")
                .map(|t| dom::normalize_whitespace(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| cell_text(2));
            if legislator.is_empty() {
                return None;
            }
            Some(VoteRow {
                legislator,
                party: cell_text(3),
                region: cell_text(4),
                vote: cell_text(5),
                photo_url: row
                    .select_attr("td:nth-child(1) img", "src")
                    .map(|src| shared::absolute(base, &src)),
                video_url: row
                    .select_attr("td:nth-child(6) a[href]", "href")
                    .map(|href| shared::absolute(base, &href)),
                legislator_id: profile_href
                    .as_deref()
                    .and_then(shared::id_from_path)
                    .map(|id| id.to_string()),
                profile_url: profile_href.map(|href| shared::absolute(base, &href)),
                date: voting.date.clone(),
                voting_id: voting.id,
            })
        })
        .collect()
}

pub struct UpperChamber;

impl UpperChamber {
    fn goto_year(&self, page: &mut Page, year: i32) -> Result<()> {
        page.choose(YEAR_SELECT, &year.to_string())
            .map_err(|e| match e {
                FetchError::OptionNotFound { .. } | FetchError::NoSuchElement(_) => {
                    Error::YearNotFound(year)
                }
                other => other.into(),
            })?;
        page.submit(SEARCH_BUTTON)?;
        Ok(())
    }

    /// Ask the table widget for bigger pages. Best effort.
    fn set_page_size(&self, page: &mut Page, select: &str, size: &str) {
        if !page.has(select) {
            tracing::debug!(select, "no page size control");
            return;
        }
        let applied = page
            .choose(select, size)
            .and_then(|_| page.dispatch_change(select));
        match applied {
            Ok(()) => tracing::info!(size, "results per page"),
            Err(e) => tracing::warn!(size, error = %e, "could not change the page size"),
        }
    }
}

/// Apply a detail page, keeping the record number the listing already read
/// when the page header lacks one.
fn apply_detail(voting: &mut VotingSummary, detail: VotingDetail) {
    let listed = voting.record;
    voting.apply_detail(detail);
    if voting.record.is_none() {
        voting.record = listed;
    }
}

impl Scraper for UpperChamber {
    fn list_year(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
    ) -> Result<Vec<VotingSummary>> {
        let listing = shared::absolute(&ctx.base_url, LISTING_PATH);
        tracing::info!(url = %listing, "opening listing");
        page.goto(&listing)?;
        tracing::info!(year, "selecting year");
        self.goto_year(page, year)?;
        self.set_page_size(page, PAGE_SIZE_SELECT, PAGE_SIZE);

        tracing::info!("reading votings");
        let mut votings = Vec::new();
        let mut visited = HashSet::new();
        if let Some(url) = page.url() {
            visited.insert(url.to_string());
        }
        for current in 1..=MAX_PAGES {
            let base = shared::page_base(page, &ctx.base_url);
            let (rows, next) = {
                let doc = page.document()?;
                (parse_listing_page(doc, &base), next_page_href(doc))
            };
            tracing::info!(page = current, count = rows.len(), "listing page read");
            votings.extend(rows);

            let Some(href) = next else { break };
            let target = page.resolve_url(&href);
            if !visited.insert(target.clone()) {
                tracing::warn!(page = current, %target, "next page already visited");
                break;
            }
            // The next link lives on the page being loaded, so a failed page
            // leaves nothing to follow.
            if let Err(e) = page.click(NEXT_PAGE) {
                tracing::error!(
                    page = current + 1,
                    %target,
                    error = %e,
                    "could not load listing page"
                );
                break;
            }
            if current == MAX_PAGES {
                tracing::warn!(pages = MAX_PAGES, "page limit reached");
            }
        }
        tracing::info!(count = votings.len(), "listing finished");
        Ok(dedupe(votings))
    }

    fn enrich(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
        voting: &mut VotingSummary,
    ) -> Step<()> {
        let url = voting.details_url.clone().unwrap_or_else(|| {
            shared::absolute(&ctx.base_url, &format!("{DETAIL_PATH}{}", voting.id))
        });
        tracing::info!(voting = voting.id, %url, "opening voting");
        if let Err(e) = page.goto(&url) {
            return Step::Abort(e.into());
        }

        let page_url = shared::page_base(page, &ctx.base_url);
        let (detail, missing) = match page.document() {
            Ok(doc) => shared::parse_detail(doc, &page_url),
            Err(e) => return Step::Abort(e.into()),
        };
        for field in missing {
            tracing::warn!(voting = voting.id, "{}", SkipReason::MissingField(field));
        }
        apply_detail(voting, detail);

        self.set_page_size(page, VOTES_SIZE_SELECT, "-1");
        let page_url = shared::page_base(page, &ctx.base_url);
        let rows = match page.document() {
            Ok(doc) => parse_vote_rows(doc, &page_url, voting),
            Err(e) => return Step::Abort(e.into()),
        };
        if rows.is_empty() {
            return Step::SkipItem(SkipReason::MissingVotes);
        }
        shared::log_count_mismatches(voting, &rows);
        match ctx.store.save_votes(ctx.provider, year, voting.id, &rows) {
            Ok(path) => {
                tracing::info!(
                    voting = voting.id,
                    rows = rows.len(),
                    path = %path.display(),
                    "votes saved"
                );
                Step::Continue(())
            }
            Err(e) => Step::Abort(e),
        }
    }

    fn collects_records(&self) -> bool {
        false
    }
}
