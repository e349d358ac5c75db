//! The three commands: listing, details and import, one year at a time.

use crate::api::Transport;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::fetch::{Browser, Page};
use crate::import::{Forwarder, ImportOptions};
use crate::model::{BillRecord, VotingSummary};
use crate::outcome::{SkipReason, Step, Tally};
use crate::providers::{Provider, ScrapeContext};
use crate::store::Store;

/// Run `work` on a fresh page, finishing the browser whatever happens.
fn with_page<R>(settings: &Settings, work: impl FnOnce(&mut Page) -> Result<R>) -> Result<R> {
    let browser = Browser::start(settings.browser_config())?;
    let result = browser
        .create_page()
        .map_err(Error::from)
        .and_then(|mut page| {
            let result = work(&mut page);
            page.close();
            result
        });
    browser.finish();
    result
}

/// Scrape the year's listing and persist it (and its bill records).
pub fn run_listing(
    settings: &Settings,
    provider: Provider,
    year: i32,
) -> Result<Vec<VotingSummary>> {
    tracing::info!(%provider, year, "listing started");
    let store = Store::new(&settings.data_dir);
    let ctx = ScrapeContext::new(&store, provider, &settings.sites)?;
    let scraper = provider.scraper();

    let votings = with_page(settings, |page| scraper.list_year(page, &ctx, year))?;
    let path = store.save_votings(provider, year, &votings)?;
    tracing::info!(count = votings.len(), path = %path.display(), "votings saved");

    if scraper.collects_records() {
        let records: Vec<BillRecord> = votings.iter().flat_map(|v| v.records.clone()).collect();
        let path = store.save_records(provider, year, &records)?;
        tracing::info!(count = records.len(), path = %path.display(), "records saved");
    }
    tracing::info!(%provider, year, "listing finished");
    Ok(votings)
}

/// Enrich every voting of the year file from its detail page, writing the
/// file back after each voting.
pub fn run_details(settings: &Settings, provider: Provider, year: i32) -> Result<Tally> {
    tracing::info!(%provider, year, "details started");
    let store = Store::new(&settings.data_dir);
    let ctx = ScrapeContext::new(&store, provider, &settings.sites)?;
    let scraper = provider.scraper();
    let mut votings = store.load_votings(provider, year)?;

    let tally = with_page(settings, |page| {
        let mut tally = Tally::default();
        for index in 0..votings.len() {
            let step = scraper.enrich(page, &ctx, year, &mut votings[index]);
            let id = votings[index].id;
            match &step {
                Step::Continue(()) => tracing::info!(voting = id, "voting finished"),
                Step::SkipItem(reason @ SkipReason::AlreadyDownloaded(_)) => {
                    tracing::info!(voting = id, %reason, "votes not downloaded")
                }
                Step::SkipItem(reason) => tracing::warn!(voting = id, %reason, "voting skipped"),
                Step::Abort(e) => tracing::error!(voting = id, error = %e, "voting failed"),
            }
            tally.record(&step);
            store.save_votings(provider, year, &votings)?;
        }
        Ok(tally)
    })?;
    tracing::info!(%provider, year, %tally, "details finished");
    Ok(tally)
}

/// Send the year's votings, records and votes to the import API.
pub fn run_import<T: Transport>(
    transport: &T,
    store: &Store,
    provider: Provider,
    year: i32,
    options: &ImportOptions,
) -> Result<Tally> {
    Forwarder::new(transport, store, provider).send_year(year, options)
}
