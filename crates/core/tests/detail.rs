//! Detail page enrichment and the vote rows checked against it.

use legis_core::dom;
use legis_core::model::{VotingDetail, VotingSummary};
use legis_core::providers::{shared, votes_csv};
use pretty_assertions::assert_eq;
use url::Url;

fn load_fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path, e))
}

fn page_url() -> Url {
    Url::parse("https://votaciones.hcdn.gob.ar/votacion/3815").unwrap()
}

#[test]
fn reads_every_detail_field() {
    let doc = dom::parse_html(&load_fixture("detail.html"));
    let (detail, missing) = shared::parse_detail(&doc, &page_url());
    assert!(missing.is_empty(), "missing: {missing:?}");
    assert_eq!(
        detail,
        VotingDetail {
            period: Some(137),
            meeting: Some(2),
            record: Some(15),
            president: Some("MONZÓ, Emilio".into()),
            affirmative_count: Some(3),
            negative_count: Some(1),
            abstention_count: Some(0),
            absent_count: Some(1),
            document_url: Some("https://votaciones.hcdn.gob.ar/pdf/votacion-3815.pdf".into()),
        }
    );
}

#[test]
fn missing_fields_are_reported_not_fatal() {
    let doc = dom::parse_html(
        r#"<div class="white-box"><div id="custom-share">
            <h4>Presidente: <b>MONZÓ, Emilio</b></h4>
        </div></div>"#,
    );
    let (detail, missing) = shared::parse_detail(&doc, &page_url());
    assert_eq!(detail.president.as_deref(), Some("MONZÓ, Emilio"));
    assert!(missing.contains(&"header"));
    assert!(missing.contains(&"documentUrl"));
    assert!(missing.contains(&"affirmativeCount"));
    assert!(!missing.contains(&"president"));
}

#[test]
fn csv_votes_agree_with_the_counters() {
    let doc = dom::parse_html(&load_fixture("detail.html"));
    let (detail, _) = shared::parse_detail(&doc, &page_url());
    let mut voting = VotingSummary::new(3815, "Presupuesto", "EN GENERAL", "AFIRMATIVO");
    voting.date = Some("2019-03-01T12:00:00.000Z".into());
    voting.apply_detail(detail);

    let csv = "diputado_id;Diputado;Bloque;Provincia;Voto\n\
               1;PEREZ, Juan;Frente;Chaco;AFIRMATIVO\n\
               2;GOMEZ, Ana;Frente;Salta;AFIRMATIVO\n\
               3;DIAZ, Luis;Bloque B;Jujuy;Afirmativo\n\
               4;RUIZ, Eva;Bloque B;Tucumán;NEGATIVO\n\
               5;SOSA, Pía;Bloque C;Misiones;AUSENTE\n";
    let rows = votes_csv::parse_votes(csv, &voting).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.voting_id == 3815));
    assert!(rows.iter().all(|r| r.date.as_deref() == Some("2019-03-01T12:00:00.000Z")));
    assert_eq!(voting.count_mismatches(&rows), Vec::<&str>::new());

    assert_eq!(voting.count_mismatches(&rows[..4]), vec!["absentCount"]);
}

#[test]
fn detail_rerun_overwrites_the_header_fields() {
    let mut voting = VotingSummary::new(3815, "Presupuesto 2019", "EN GENERAL", "AFIRMATIVO");
    voting.meeting = Some(5);
    voting.record = Some(12);
    voting.president = Some("stale".into());
    voting.apply_detail(VotingDetail {
        period: Some(137),
        ..VotingDetail::default()
    });
    assert_eq!(voting.period, Some(137));
    assert_eq!(voting.meeting, None);
    assert_eq!(voting.record, None);
    assert_eq!(voting.president, None);
}
