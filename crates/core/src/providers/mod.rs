//! Chamber-specific scrapers behind one closed registry.

pub mod deputies;
pub mod senators;
pub mod shared;
pub mod votes_csv;

use crate::config::Sites;
use crate::error::{Error, Result};
use crate::fetch::Page;
use crate::import::ImportProfile;
use crate::model::VotingSummary;
use crate::outcome::Step;
use crate::store::Store;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A legislative chamber whose votings we scrape and import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    LowerChamber,
    UpperChamber,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::LowerChamber, Provider::UpperChamber];

    /// Canonical token, also the provider's folder in the data directory.
    pub fn token(self) -> &'static str {
        match self {
            Provider::LowerChamber => "lower-chamber",
            Provider::UpperChamber => "upper-chamber",
        }
    }

    pub fn scraper(self) -> &'static dyn Scraper {
        match self {
            Provider::LowerChamber => &deputies::LowerChamber,
            Provider::UpperChamber => &senators::UpperChamber,
        }
    }

    pub fn import_profile(self) -> ImportProfile {
        match self {
            Provider::LowerChamber => ImportProfile::LOWER_CHAMBER,
            Provider::UpperChamber => ImportProfile::UPPER_CHAMBER,
        }
    }

    pub fn site(self, sites: &Sites) -> &str {
        match self {
            Provider::LowerChamber => &sites.lower_chamber,
            Provider::UpperChamber => &sites.upper_chamber,
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lower-chamber" | "diputados" | "ar-diputados" | "deputies" => {
                Ok(Provider::LowerChamber)
            }
            "upper-chamber" | "senadores" | "ar-senadores" | "senators" => {
                Ok(Provider::UpperChamber)
            }
            _ => Err(Error::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// What a scraper needs besides the page: where to persist and where the
/// site lives.
pub struct ScrapeContext<'a> {
    pub store: &'a Store,
    pub provider: Provider,
    pub base_url: Url,
}

impl<'a> ScrapeContext<'a> {
    pub fn new(store: &'a Store, provider: Provider, sites: &Sites) -> Result<Self> {
        let site = provider.site(sites);
        let base_url = Url::parse(site)
            .map_err(|e| Error::Config(format!("invalid site URL `{site}` for {provider}: {e}")))?;
        Ok(Self {
            store,
            provider,
            base_url,
        })
    }
}

/// Listing and detail extraction for one chamber.
pub trait Scraper: Sync {
    /// Every voting of `year`, in page order, ids unique.
    fn list_year(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
    ) -> Result<Vec<VotingSummary>>;

    /// Fill the detail fields of `voting` from its detail page and persist
    /// its votes. The summary keeps whatever was extracted even when the
    /// step is not `Continue`.
    fn enrich(
        &self,
        page: &mut Page,
        ctx: &ScrapeContext,
        year: i32,
        voting: &mut VotingSummary,
    ) -> Step<()>;

    /// Whether listings carry bill records worth their own file.
    fn collects_records(&self) -> bool;
}

/// Keep the first voting of every id, dropping non-positive ids.
pub(crate) fn dedupe(votings: Vec<VotingSummary>) -> Vec<VotingSummary> {
    let mut seen = HashSet::new();
    votings
        .into_iter()
        .filter(|voting| {
            if voting.id == 0 {
                tracing::warn!(title = %voting.title, "dropping voting without a valid id");
                return false;
            }
            if !seen.insert(voting.id) {
                tracing::warn!(id = voting.id, "dropping duplicated voting");
                return false;
            }
            true
        })
        .collect()
}
