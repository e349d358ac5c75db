//! Explicit per-item outcomes: keep going, skip this item, or abort it.

use crate::error::Error;
use std::fmt;
use std::path::PathBuf;

/// What happened to one item (row, voting, submission).
#[derive(Debug)]
pub enum Step<T> {
    Continue(T),
    SkipItem(SkipReason),
    Abort(Error),
}

impl<T> From<Result<T, Error>> for Step<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Step::Continue(value),
            Err(err) => Step::Abort(err),
        }
    }
}

/// Why an item was skipped. Skips are expected and never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The votes folder already holds a file.
    AlreadyDownloaded(PathBuf),
    /// A field the step depends on is absent.
    MissingField(&'static str),
    /// The row has no control that reveals its records.
    NothingToClick,
    /// The result is not one the remote API accepts.
    UnexpectedResult(String),
    /// Excluded by the id filter.
    NotInFilter,
    /// Already recorded in the import ledger.
    AlreadyImported(String),
    /// No votes file for this voting.
    MissingVotes,
    /// The creation response carried no id.
    MissingRemoteId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyDownloaded(path) => {
                write!(f, "votes already downloaded in {}", path.display())
            }
            SkipReason::MissingField(field) => write!(f, "missing field `{field}`"),
            SkipReason::NothingToClick => f.write_str("nothing to click"),
            SkipReason::UnexpectedResult(result) => write!(f, "unexpected result `{result}`"),
            SkipReason::NotInFilter => f.write_str("not in the id filter"),
            SkipReason::AlreadyImported(remote) => write!(f, "already imported as {remote}"),
            SkipReason::MissingVotes => f.write_str("no votes file"),
            SkipReason::MissingRemoteId => f.write_str("remote API returned no id"),
        }
    }
}

/// Counts of outcomes over a batch, logged at the end of every command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub continued: usize,
    pub skipped: usize,
    pub aborted: usize,
}

impl Tally {
    pub fn record<T>(&mut self, step: &Step<T>) {
        match step {
            Step::Continue(_) => self.continued += 1,
            Step::SkipItem(_) => self.skipped += 1,
            Step::Abort(_) => self.aborted += 1,
        }
    }

    /// Add another batch's counts, e.g. the next year of a range.
    pub fn merge(&mut self, other: Tally) {
        self.continued += other.continued;
        self.skipped += other.skipped;
        self.aborted += other.aborted;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} skipped, {} failed",
            self.continued, self.skipped, self.aborted
        )
    }
}
