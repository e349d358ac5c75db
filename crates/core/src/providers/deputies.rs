//! Lower chamber (votaciones.hcdn.gob.ar): a single listing page per year,
//! bill records in reveal panels, votes as a CSV export.

use super::{dedupe, shared, votes_csv, ScrapeContext, Scraper};
use crate::dom::{self, DomNode};
use crate::error::{Error, Result};
use crate::fetch::{FetchError, Page};
use crate::model::{BillRecord, VotingSummary};
use crate::outcome::{SkipReason, Step};
use url::Url;

const YEAR_SELECT: &str = "select#select-ano";
const ROWS: &str = ".table-responsive tbody#container-actas > tr.row-acta";
const DETAIL_BUTTON: &str = "td > center > button:nth-child(2)";
const RECORD_PANELS: &str = "div[tituloexpediente]";
const REVEAL_LINK: &str = "a[id]";
const CSV_LINK: &str = r#"a[title="Descargar datos en CSV"]"#;

/// How a listing row exposes its bill records.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordsPanel {
    /// Panels already in the page (possibly none).
    Inline(Vec<BillRecord>),
    /// Empty panel behind a "Ver expedientes" link.
    Reveal(String),
    /// No panel and no link.
    NothingToClick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub voting: VotingSummary,
    pub records: RecordsPanel,
}

/// Extract every voting row of a year's listing page.
pub fn parse_listing(doc: &DomNode, base: &Url) -> Vec<ListingRow> {
    doc.select(ROWS)
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let parsed = parse_row(row, base);
            if parsed.is_none() {
                tracing::warn!(row = index + 1, "listing row has no detail link, skipped");
            }
            parsed
        })
        .collect()
}

fn parse_row(row: &DomNode, base: &Url) -> Option<ListingRow> {
    let detail_path = row.select_attr(DETAIL_BUTTON, "urldetalle")?;
    let id = shared::id_from_path(&detail_path)?;

    let cell = |n: usize| row.select_first(&format!("td:nth-child({n})"));
    let cell_text = |n: usize| {
        cell(n)
            .map(|td| td.text_content())
            .unwrap_or_default()
    };

    let title = cell(2)
        .map(|td| {
            let text = td.text_content_without(&|n| {
                n.get_attr("tituloexpediente").is_some()
                    || (n.tag == "a" && n.get_attr("id").is_some())
            });
            dom::normalize_whitespace(&text.replace("(Ver expedientes)", ""))
        })
        .unwrap_or_default();

    let mut voting = VotingSummary::new(id, title, cell_text(3), cell_text(4));
    voting.date = row.get_attr("data-date").and_then(shared::iso_from_epoch);
    voting.details_url = Some(shared::absolute(base, &detail_path));

    let records = match cell(2) {
        Some(td) => records_panel(td, id),
        None => RecordsPanel::NothingToClick,
    };
    Some(ListingRow { voting, records })
}

fn records_panel(cell: &DomNode, voting_id: u64) -> RecordsPanel {
    let inline = parse_records(cell, voting_id);
    if !inline.is_empty() {
        return RecordsPanel::Inline(inline);
    }
    match cell.select_first(REVEAL_LINK) {
        Some(link) => match link.get_attr("href") {
            Some(href)
                if link.text_content().contains("Ver") && !crate::fetch::is_inert_href(href) =>
            {
                RecordsPanel::Reveal(href.to_string())
            }
            _ => RecordsPanel::Inline(Vec::new()),
        },
        None => RecordsPanel::NothingToClick,
    }
}

/// Bill records in the panels under `root`.
pub fn parse_records(root: &DomNode, voting_id: u64) -> Vec<BillRecord> {
    root.select(RECORD_PANELS)
        .into_iter()
        .filter_map(|panel| {
            let id = panel.get_attr("identificador")?.trim().to_string();
            let title =
                dom::normalize_whitespace(panel.get_attr("tituloexpediente").unwrap_or_default());
            Some(BillRecord {
                id,
                title,
                voting_id,
            })
        })
        .collect()
}

pub struct LowerChamber;

impl LowerChamber {
    fn goto_year(&self, page: &mut Page, year: i32) -> Result<()> {
        page.choose(YEAR_SELECT, &year.to_string())
            .map_err(|e| match e {
                FetchError::OptionNotFound { .. } | FetchError::NoSuchElement(_) => {
                    Error::YearNotFound(year)
                }
                other => other.into(),
            })?;
        page.dispatch_change(YEAR_SELECT)?;
        Ok(())
    }

    fn reveal_records(&self, page: &Page, href: &str, voting_id: u64) -> Vec<BillRecord> {
        match page.reveal(href) {
            Ok(fragment) => {
                let records = parse_records(&fragment, voting_id);
                if records.is_empty() {
                    tracing::warn!(voting = voting_id, "voting has no records");
                }
                records
            }
            Err(e) => {
                tracing::warn!(voting = voting_id, error = %e, "could not reveal records");
                Vec::new()
            }
        }
    }

    fn download_votes(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
        voting: &VotingSummary,
    ) -> Step<()> {
        let folder = ctx.store.download_dir(ctx.provider, voting.id);
        let existing = match ctx.store.list_files(&folder) {
            Ok(files) => files,
            Err(e) => return Step::Abort(e),
        };
        if !existing.is_empty() {
            return Step::SkipItem(SkipReason::AlreadyDownloaded(ctx.store.path(&folder)));
        }
        if !page.has(CSV_LINK) {
            return Step::SkipItem(SkipReason::MissingField("csv export"));
        }

        tracing::info!(voting = voting.id, "downloading votes file");
        page.set_download_path(ctx.store.path(&folder));
        let file = match page.download(CSV_LINK) {
            Ok(file) => file,
            Err(e) => return Step::Abort(e.into()),
        };
        let converted = std::fs::read_to_string(&file)
            .map_err(|source| Error::Io {
                path: file.clone(),
                source,
            })
            .and_then(|content| votes_csv::parse_votes(&content, voting))
            .and_then(|rows| {
                shared::log_count_mismatches(voting, &rows);
                ctx.store.save_votes(ctx.provider, year, voting.id, &rows)
            });
        match converted {
            Ok(path) => {
                tracing::info!(voting = voting.id, path = %path.display(), "votes saved");
                Step::Continue(())
            }
            Err(e) => Step::Abort(e),
        }
    }
}

impl Scraper for LowerChamber {
    fn list_year(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
    ) -> Result<Vec<VotingSummary>> {
        tracing::info!(url = %ctx.base_url, "opening listing");
        page.goto(ctx.base_url.as_str())?;
        tracing::info!(year, "selecting year");
        self.goto_year(page, year)?;

        tracing::info!("reading votings");
        let base = shared::page_base(page, &ctx.base_url);
        let rows = parse_listing(page.document()?, &base);
        tracing::info!(count = rows.len(), "votings found");

        let mut votings = Vec::with_capacity(rows.len());
        for ListingRow { mut voting, records } in rows {
            voting.records = match records {
                RecordsPanel::Inline(records) => records,
                RecordsPanel::Reveal(href) => self.reveal_records(page, &href, voting.id),
                RecordsPanel::NothingToClick => {
                    tracing::warn!(voting = voting.id, "{}", SkipReason::NothingToClick);
                    Vec::new()
                }
            };
            tracing::debug!(voting = voting.id, records = voting.records.len(), "records read");
            votings.push(voting);
        }
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
            shared::absolute(&ctx.base_url, &format!("/votacion/{}", voting.id))
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
        voting.apply_detail(detail);

        self.download_votes(page, ctx, year, voting)
    }

    fn collects_records(&self) -> bool {
        true
    }
}
