//! The lower chamber's CSV vote export, read into vote rows.

use crate::error::{Error, Result};
use crate::model::{VoteRow, VotingSummary};

/// Fold a header to lowercase ASCII for lookups.
fn fold(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' => 'u',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// The export uses `,` or `;` depending on the site version.
fn delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

struct Columns {
    legislator: usize,
    party: Option<usize>,
    region: Option<usize>,
    vote: usize,
    legislator_id: Option<usize>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self> {
        let folded: Vec<String> = headers.iter().map(fold).collect();
        let find = |wanted: &dyn Fn(&str) -> bool| folded.iter().position(|h| wanted(h.as_str()));

        let legislator = find(&|h: &str| {
            h == "diputado" || h == "legislador" || h.contains("nombre")
        })
        .ok_or(Error::MissingField("legislator"))?;
        let vote = find(&|h: &str| h == "vote" || h.starts_with("voto") || h == "votacion")
            .ok_or(Error::MissingField("vote"))?;
        Ok(Self {
            legislator,
            party: find(&|h: &str| h.contains("bloque") || h.contains("partido")),
            region: find(&|h: &str| h.contains("provincia") || h.contains("distrito")),
            vote,
            legislator_id: find(&|h: &str| {
                h.ends_with("_id") && (h.starts_with("diputado") || h.starts_with("legislador"))
            }),
        })
    }
}

/// Read every vote row of a CSV export, denormalizing the voting's date
/// and id onto each row.
pub fn parse_votes(content: &str, voting: &VotingSummary) -> Result<Vec<VoteRow>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter(content))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let columns = Columns::locate(reader.headers()?)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: Option<usize>| {
            i.and_then(|i| record.get(i))
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        let legislator = field(Some(columns.legislator));
        if legislator.is_empty() {
            continue;
        }
        rows.push(VoteRow {
            legislator,
            party: field(columns.party),
            region: field(columns.region),
            vote: field(Some(columns.vote)),
            photo_url: None,
            video_url: None,
            legislator_id: Some(field(columns.legislator_id)).filter(|id| !id.is_empty()),
            profile_url: None,
            date: voting.date.clone(),
            voting_id: voting.id,
        });
    }
    Ok(rows)
}
