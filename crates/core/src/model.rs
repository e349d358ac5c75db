//! Records scraped from the chamber sites and persisted as JSON.

use serde::{Deserialize, Serialize};

/// One legislative vote event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingSummary {
    pub id: u64,
    /// ISO-8601, when the listing carried a parsable date.
    pub date: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub result: String,
    pub record_url: Option<String>,
    pub details_url: Option<String>,
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub records: Vec<BillRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub president: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affirmative_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstention_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

impl VotingSummary {
    /// A summary with only the listing essentials set.
    pub fn new(
        id: u64,
        title: impl Into<String>,
        kind: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            id,
            date: None,
            title: title.into(),
            kind: kind.into(),
            result: result.into(),
            record_url: None,
            details_url: None,
            video_url: None,
            file_url: None,
            records: Vec::new(),
            period: None,
            meeting: None,
            record: None,
            president: None,
            affirmative_count: None,
            negative_count: None,
            abstention_count: None,
            absent_count: None,
            document_url: None,
        }
    }

    /// Overwrite every detail field with what the detail page showed.
    pub fn apply_detail(&mut self, detail: VotingDetail) {
        self.period = detail.period;
        self.meeting = detail.meeting;
        self.record = detail.record;
        self.president = detail.president;
        self.affirmative_count = detail.affirmative_count;
        self.negative_count = detail.negative_count;
        self.abstention_count = detail.abstention_count;
        self.absent_count = detail.absent_count;
        self.document_url = detail.document_url;
    }

    /// Compare scraped vote rows against the aggregate counts. Returns the
    /// names of the counts that disagree.
    pub fn count_mismatches(&self, rows: &[VoteRow]) -> Vec<&'static str> {
        let counted = VoteCounts::from_rows(rows);
        let mut mismatches = Vec::new();
        let pairs = [
            ("affirmativeCount", self.affirmative_count, counted.affirmative),
            ("negativeCount", self.negative_count, counted.negative),
            ("abstentionCount", self.abstention_count, counted.abstention),
            ("absentCount", self.absent_count, counted.absent),
        ];
        for (name, expected, actual) in pairs {
            if let Some(expected) = expected {
                if expected != actual {
                    mismatches.push(name);
                }
            }
        }
        mismatches
    }
}

/// Aggregate fields read from a detail page. Absent means not found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VotingDetail {
    pub period: Option<u32>,
    pub meeting: Option<u32>,
    pub record: Option<u32>,
    pub president: Option<String>,
    pub affirmative_count: Option<u32>,
    pub negative_count: Option<u32>,
    pub abstention_count: Option<u32>,
    pub absent_count: Option<u32>,
    pub document_url: Option<String>,
}

/// A bill or file voted on in a voting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    pub id: String,
    pub title: String,
    pub voting_id: u64,
}

/// One legislator's vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRow {
    pub legislator: String,
    pub party: String,
    pub region: String,
    pub vote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legislator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    pub date: Option<String>,
    pub voting_id: u64,
}

/// The four ways a legislator's vote is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Affirmative,
    Negative,
    Abstention,
    Absent,
}

impl VoteKind {
    /// Classify a site vote token (`AFIRMATIVO`, `SI`, `Abstención`...).
    pub fn classify(token: &str) -> Option<Self> {
        let folded: String = token
            .trim()
            .chars()
            .map(|c| match c {
                'á' | 'Á' => 'A',
                'é' | 'É' => 'E',
                'í' | 'Í' => 'I',
                'ó' | 'Ó' => 'O',
                'ú' | 'Ú' => 'U',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match folded.as_str() {
            "AFIRMATIVO" | "SI" => Some(VoteKind::Affirmative),
            "NEGATIVO" | "NO" => Some(VoteKind::Negative),
            "ABSTENCION" | "ABSTENIDO" => Some(VoteKind::Abstention),
            "AUSENTE" => Some(VoteKind::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct VoteCounts {
    affirmative: u32,
    negative: u32,
    abstention: u32,
    absent: u32,
}

impl VoteCounts {
    fn from_rows(rows: &[VoteRow]) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match VoteKind::classify(&row.vote) {
                Some(VoteKind::Affirmative) => counts.affirmative += 1,
                Some(VoteKind::Negative) => counts.negative += 1,
                Some(VoteKind::Abstention) => counts.abstention += 1,
                Some(VoteKind::Absent) => counts.absent += 1,
                None => {}
            }
        }
        counts
    }
}
