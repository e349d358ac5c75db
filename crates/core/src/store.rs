//! File persistence under the data directory.
//!
//! Layout, per provider:
//! `<provider>/<year>.json`, `<provider>/records/<year>-records.json`,
//! `<provider>/votes/<year>/<id>.json`, `<provider>/votes/<id>/<file>`,
//! `<provider>/imported/<year>.json`.

use crate::error::{Error, Result};
use crate::model::{BillRecord, VoteRow, VotingSummary};
use crate::providers::Provider;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Local id to remote id, for votings already sent to the import API.
pub type Ledger = BTreeMap<u64, String>;

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }

    pub fn read_json<T: DeserializeOwned>(&self, relative: impl AsRef<Path>) -> Result<T> {
        let path = self.path(relative);
        let raw = fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| Error::Json { path, source })
    }

    /// Write pretty-printed JSON, creating parent directories.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        relative: impl AsRef<Path>,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.path(relative);
        let json = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
            path: path.clone(),
            source,
        })?;
        write_file(&path, json.as_bytes())?;
        Ok(path)
    }

    pub fn write_content(&self, relative: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        write_file(&path, content.as_bytes())?;
        Ok(path)
    }

    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        fs::read_to_string(&path).map_err(|source| Error::Io { path, source })
    }

    /// File names in a directory, sorted. A missing directory is empty.
    pub fn list_files(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = self.path(relative);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(Error::Io { path: dir, source }),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Io {
                path: dir.clone(),
                source,
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".DS_Store" {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn ensure_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self.path(relative);
        fs::create_dir_all(&dir).map_err(|source| Error::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    pub fn load_votings(&self, provider: Provider, year: i32) -> Result<Vec<VotingSummary>> {
        self.read_json(year_file(provider, year))
    }

    pub fn save_votings(
        &self,
        provider: Provider,
        year: i32,
        votings: &[VotingSummary],
    ) -> Result<PathBuf> {
        self.write_json(year_file(provider, year), votings)
    }

    pub fn save_records(
        &self,
        provider: Provider,
        year: i32,
        records: &[BillRecord],
    ) -> Result<PathBuf> {
        let relative = Path::new(provider.token())
            .join("records")
            .join(format!("{year}-records.json"));
        self.write_json(relative, records)
    }

    pub fn save_votes(
        &self,
        provider: Provider,
        year: i32,
        voting_id: u64,
        votes: &[VoteRow],
    ) -> Result<PathBuf> {
        self.write_json(votes_file(provider, year, voting_id), votes)
    }

    /// Vote rows of one voting, or `None` when none were persisted.
    pub fn load_votes(
        &self,
        provider: Provider,
        year: i32,
        voting_id: u64,
    ) -> Result<Option<Vec<VoteRow>>> {
        let relative = votes_file(provider, year, voting_id);
        if !self.exists(&relative) {
            return Ok(None);
        }
        self.read_json(relative).map(Some)
    }

    /// Relative folder where a voting's raw vote download lands.
    pub fn download_dir(&self, provider: Provider, voting_id: u64) -> PathBuf {
        Path::new(provider.token())
            .join("votes")
            .join(voting_id.to_string())
    }

    /// The import ledger of a year; empty when none was written yet.
    pub fn load_ledger(&self, provider: Provider, year: i32) -> Result<Ledger> {
        let relative = ledger_file(provider, year);
        if !self.exists(&relative) {
            return Ok(Ledger::new());
        }
        self.read_json(relative)
    }

    pub fn save_ledger(&self, provider: Provider, year: i32, ledger: &Ledger) -> Result<PathBuf> {
        self.write_json(ledger_file(provider, year), ledger)
    }
}

fn year_file(provider: Provider, year: i32) -> PathBuf {
    Path::new(provider.token()).join(format!("{year}.json"))
}

fn votes_file(provider: Provider, year: i32, voting_id: u64) -> PathBuf {
    Path::new(provider.token())
        .join("votes")
        .join(year.to_string())
        .join(format!("{voting_id}.json"))
}

fn ledger_file(provider: Provider, year: i32) -> PathBuf {
    Path::new(provider.token())
        .join("imported")
        .join(format!("{year}.json"))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
