//! Forward a scraped year to the remote import API.

use crate::api::{ApiError, ApiResponse, Transport};
use crate::error::{Error, Result};
use crate::model::{VoteRow, VotingSummary};
use crate::outcome::{SkipReason, Step, Tally};
use crate::providers::{votes_csv, Provider};
use crate::store::{Ledger, Store};
use serde::Serialize;

/// Per-chamber endpoints and accepted results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProfile {
    pub endpoint: &'static str,
    /// Collection segment of the votes endpoint (`voting` or `votings`).
    pub votes_collection: &'static str,
    pub results: &'static [&'static str],
    pub sends_records: bool,
}

impl ImportProfile {
    pub const LOWER_CHAMBER: ImportProfile = ImportProfile {
        endpoint: "api/import/ar/deputies",
        votes_collection: "voting",
        results: &["AFIRMATIVO", "NEGATIVO", "EMPATE"],
        sends_records: true,
    };

    pub const UPPER_CHAMBER: ImportProfile = ImportProfile {
        endpoint: "api/import/ar/senators",
        votes_collection: "votings",
        results: &["AFIRMATIVO", "NEGATIVO", "EMPATE", "LEV. VOT."],
        sends_records: false,
    };

    pub fn accepts(&self, result: &str) -> bool {
        self.results.contains(&result)
    }

    pub fn voting_endpoint(&self) -> String {
        format!("{}/voting", self.endpoint)
    }

    pub fn records_endpoint(&self, remote_id: &str) -> String {
        format!("{}/voting/{remote_id}/records", self.endpoint)
    }

    pub fn votes_endpoint(&self, remote_id: &str) -> String {
        format!("{}/{}/{remote_id}/votes", self.endpoint, self.votes_collection)
    }
}

/// What to send, and to whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Only these voting ids; empty sends every voting.
    pub only: Vec<u64>,
    pub records: bool,
    pub votes: bool,
    /// Remember sent votings and skip them on later runs.
    pub ledger: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            only: Vec::new(),
            records: true,
            votes: true,
            ledger: false,
        }
    }
}

pub struct Forwarder<'a, T: Transport> {
    transport: &'a T,
    store: &'a Store,
    provider: Provider,
    profile: ImportProfile,
}

impl<'a, T: Transport> Forwarder<'a, T> {
    pub fn new(transport: &'a T, store: &'a Store, provider: Provider) -> Self {
        Self {
            transport,
            store,
            provider,
            profile: provider.import_profile(),
        }
    }

    /// Send every voting of `year`. Only a missing or unreadable year file
    /// is an error; every voting failure is logged and counted.
    pub fn send_year(&self, year: i32, options: &ImportOptions) -> Result<Tally> {
        let votings = self.store.load_votings(self.provider, year)?;
        let mut ledger = if options.ledger {
            self.store.load_ledger(self.provider, year)?
        } else {
            Ledger::new()
        };
        tracing::info!(provider = %self.provider, year, count = votings.len(), "importing votings");

        let mut tally = Tally::default();
        for voting in &votings {
            let step = self.send_voting(year, voting, options, &ledger);
            match &step {
                Step::Continue(remote_id) => {
                    tracing::info!(voting = voting.id, remote = %remote_id, "voting imported");
                    if options.ledger {
                        ledger.insert(voting.id, remote_id.clone());
                        if let Err(e) = self.store.save_ledger(self.provider, year, &ledger) {
                            tracing::error!(error = %e, "could not update the import ledger");
                        }
                    }
                }
                Step::SkipItem(reason @ SkipReason::UnexpectedResult(_)) => {
                    tracing::error!(voting = voting.id, %reason, "voting not sent");
                }
                Step::SkipItem(SkipReason::NotInFilter) => {}
                Step::SkipItem(reason) => {
                    tracing::warn!(voting = voting.id, %reason, "voting skipped")
                }
                Step::Abort(e) => {
                    tracing::error!(voting = voting.id, error = %e, "voting import failed")
                }
            }
            tally.record(&step);
        }
        tracing::info!(provider = %self.provider, year, %tally, "import finished");
        Ok(tally)
    }

    /// Create one voting remotely, then its records and votes. Returns the
    /// remote id.
    pub fn send_voting(
        &self,
        year: i32,
        voting: &VotingSummary,
        options: &ImportOptions,
        ledger: &Ledger,
    ) -> Step<String> {
        if !self.profile.accepts(&voting.result) {
            return Step::SkipItem(SkipReason::UnexpectedResult(voting.result.clone()));
        }
        if !options.only.is_empty() && !options.only.contains(&voting.id) {
            return Step::SkipItem(SkipReason::NotInFilter);
        }
        if let Some(remote_id) = ledger.get(&voting.id) {
            return Step::SkipItem(SkipReason::AlreadyImported(remote_id.clone()));
        }

        let endpoint = self.profile.voting_endpoint();
        let response = match self.post(&endpoint, voting) {
            Ok(response) => response,
            Err(e) => return Step::Abort(e),
        };
        tracing::info!(status = response.status, voting = voting.id, %endpoint, "voting sent");
        if response.is_error() {
            return Step::Abort(
                ApiError::Rejected {
                    endpoint,
                    status: response.status,
                }
                .into(),
            );
        }
        let Some(remote_id) = response.remote_id() else {
            return Step::SkipItem(SkipReason::MissingRemoteId);
        };

        if options.records && self.profile.sends_records {
            let endpoint = self.profile.records_endpoint(&remote_id);
            self.send_dependent(&endpoint, voting.id, "records", &voting.records);
        }
        if options.votes {
            match self.load_votes(year, voting) {
                Ok(Some(votes)) => {
                    let endpoint = self.profile.votes_endpoint(&remote_id);
                    self.send_dependent(&endpoint, voting.id, "votes", &votes);
                }
                Ok(None) => tracing::warn!(voting = voting.id, "{}", SkipReason::MissingVotes),
                Err(e) => tracing::error!(voting = voting.id, error = %e, "could not read votes"),
            }
        }
        Step::Continue(remote_id)
    }

    fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<ApiResponse> {
        let json = serde_json::to_value(body).map_err(|source| Error::Json {
            path: endpoint.into(),
            source,
        })?;
        Ok(self.transport.post_json(endpoint, &json)?)
    }

    /// Best effort: a failure is logged and never affects the voting.
    fn send_dependent<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        voting_id: u64,
        what: &str,
        body: &B,
    ) {
        match self.post(endpoint, body) {
            Ok(response) if response.is_error() => tracing::error!(
                status = response.status,
                voting = voting_id,
                %endpoint,
                "could not create the {what}"
            ),
            Ok(response) => {
                tracing::info!(
                    status = response.status,
                    voting = voting_id,
                    %endpoint,
                    "{what} sent"
                )
            }
            Err(e) => {
                tracing::error!(
                    voting = voting_id,
                    %endpoint,
                    error = %e,
                    "could not send the {what}"
                )
            }
        }
    }

    /// Votes from the voting's JSON file, else from the first file of its
    /// download folder.
    fn load_votes(&self, year: i32, voting: &VotingSummary) -> Result<Option<Vec<VoteRow>>> {
        if let Some(votes) = self.store.load_votes(self.provider, year, voting.id)? {
            return Ok(Some(votes));
        }
        let folder = self.store.download_dir(self.provider, voting.id);
        let Some(first) = self.store.list_files(&folder)?.into_iter().next() else {
            return Ok(None);
        };
        let content = self.store.read_to_string(folder.join(first))?;
        votes_csv::parse_votes(&content, voting).map(Some)
    }
}
