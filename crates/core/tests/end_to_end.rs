//! Whole commands against an in-process copy of the chamber sites.

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Json, Router};
use legis_core::api::{ApiClient, Transport};
use legis_core::config::{ApiSettings, Environment, Settings, Sites};
use legis_core::import::ImportOptions;
use legis_core::model::{BillRecord, VotingSummary};
use legis_core::outcome::Tally;
use legis_core::pipeline;
use legis_core::store::Store;
use legis_core::{Error, Provider};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

/// Serve `app` on a random local port from its own runtime thread.
fn serve(app: Router) -> String {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

fn settings(base: &str, data: &Path) -> Settings {
    Settings {
        environment: Environment::Production,
        data_dir: data.to_path_buf(),
        log_dir: data.to_path_buf(),
        api: ApiSettings {
            uri: None,
            token: None,
            accept_invalid_certs: false,
        },
        sites: Sites {
            lower_chamber: base.to_string(),
            upper_chamber: base.to_string(),
        },
        step_delay_ms: Some(0),
    }
}

fn detail_page(id: &str, counts: [u32; 4], extra: &str) -> String {
    let [affirmative, negative, abstention, absent] = counts;
    format!(
        r#"<html><body><div class="container-fluid">
            <div><div class="row"><h5>Período 137 - Reunión 2 - Acta {id}</h5></div></div>
            <div class="white-box">
                <div id="custom-share"><h4>Presidente: <b>MONZÓ, Emilio</b></h4></div>
                <div>Miércoles</div>
                <div>
                    <h5>Documento: <a href="/pdf/{id}.pdf">Acta</a></h5>
                    <div class="row">
                        <div><ul><h3>{affirmative}</h3></ul></div>
                        <div><ul><h3>{negative}</h3></ul></div>
                        <div><ul><h3>{abstention}</h3></ul></div>
                        <div><ul><h3>{absent}</h3></ul></div>
                    </div>
                    {extra}
                </div>
            </div>
        </div></body></html>"#
    )
}

// Lower chamber

const LOWER_ROWS: &str = r#"
    <tr class="row-acta" data-date="1551441600">
        <td><center><button>PDF</button><button urldetalle="/votacion/1">Ver</button></center></td>
        <td>Ley A <div tituloexpediente="Ley A" identificador="100-D-2019"></div></td>
        <td>EN GENERAL</td>
        <td>AFIRMATIVO</td>
    </tr>
    <tr class="row-acta" data-date="1551528000">
        <td><center><button>PDF</button><button urldetalle="/votacion/2">Ver</button></center></td>
        <td>Ley B <a id="ver-2" href="/expedientes/2">(Ver expedientes)</a></td>
        <td>EN GENERAL</td>
        <td>NEGATIVO</td>
    </tr>"#;

fn lower_listing(rows: &str) -> String {
    format!(
        r#"<html><body>
            <select id="select-ano">
                <option value="2020" selected>2020</option>
                <option value="2019">2019</option>
            </select>
            <div class="table-responsive">
                <table><tbody id="container-actas">{rows}</tbody></table>
            </div>
        </body></html>"#
    )
}

fn lower_csv(id: &str) -> &'static str {
    match id {
        "1" => {
            "Diputado,Bloque,Provincia,Voto\n\
             PEREZ Juan,Frente,Chaco,AFIRMATIVO\n\
             GOMEZ Ana,Frente,Salta,AFIRMATIVO\n"
        }
        _ => {
            "Diputado,Bloque,Provincia,Voto\n\
             RUIZ Eva,Bloque B,Jujuy,NEGATIVO\n\
             SOSA Pia,Bloque C,Misiones,AUSENTE\n"
        }
    }
}

async fn lower_site(State(downloads): State<Arc<AtomicUsize>>, uri: Uri) -> Response {
    let path = uri.path();
    if path == "/" {
        let rows = if uri.query().unwrap_or("").contains("select-ano=2019") {
            LOWER_ROWS
        } else {
            ""
        };
        return Html(lower_listing(rows)).into_response();
    }
    if path == "/expedientes/2" {
        let panel = r#"<div tituloexpediente="Ley B" identificador="200-D-2019"></div>"#;
        return Html(panel).into_response();
    }
    let Some(rest) = path.strip_prefix("/votacion/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match rest.split_once('/') {
        None if rest == "1" || rest == "2" => {
            let counts = if rest == "1" { [2, 0, 0, 0] } else { [0, 1, 0, 1] };
            let link =
                format!(r#"<a title="Descargar datos en CSV" href="/votacion/{rest}/csv">CSV</a>"#);
            Html(detail_page(rest, counts, &link)).into_response()
        }
        Some((id, "csv")) if id == "1" || id == "2" => {
            downloads.fetch_add(1, Ordering::SeqCst);
            (
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"votacion-{id}.csv\""),
                    ),
                ],
                lower_csv(id),
            )
                .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn lower_chamber() -> (String, Arc<AtomicUsize>) {
    let downloads = Arc::new(AtomicUsize::new(0));
    let app = Router::new().fallback(lower_site).with_state(downloads.clone());
    (serve(app), downloads)
}

#[test]
fn lower_chamber_listing_then_details() {
    let (base, downloads) = lower_chamber();
    let data = tempfile::tempdir().unwrap();
    let settings = settings(&base, data.path());
    let store = Store::new(data.path());

    let votings = pipeline::run_listing(&settings, Provider::LowerChamber, 2019).unwrap();
    let ids: Vec<u64> = votings.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(votings[0].details_url, Some(format!("{base}/votacion/1")));
    assert_eq!(
        votings[1].records,
        vec![BillRecord {
            id: "200-D-2019".into(),
            title: "Ley B".into(),
            voting_id: 2,
        }]
    );
    let records: Vec<BillRecord> =
        store.read_json("lower-chamber/records/2019-records.json").unwrap();
    assert_eq!(records.len(), 2);

    let tally = pipeline::run_details(&settings, Provider::LowerChamber, 2019).unwrap();
    assert_eq!(
        tally,
        Tally {
            continued: 2,
            skipped: 0,
            aborted: 0
        }
    );
    assert_eq!(downloads.load(Ordering::SeqCst), 2);
    assert!(store.exists("lower-chamber/votes/1/votacion-1.csv"));

    let saved = store.load_votings(Provider::LowerChamber, 2019).unwrap();
    assert_eq!(saved[0].affirmative_count, Some(2));
    assert_eq!(saved[1].absent_count, Some(1));
    assert_eq!(saved[1].president.as_deref(), Some("MONZÓ, Emilio"));
    assert_eq!(saved[1].document_url, Some(format!("{base}/pdf/2.pdf")));

    let votes = store.load_votes(Provider::LowerChamber, 2019, 2).unwrap().unwrap();
    assert_eq!(votes.len(), 2);
    assert_eq!(votes[0].legislator, "RUIZ Eva");
    assert_eq!(votes[0].date.as_deref(), Some("2019-03-02T12:00:00.000Z"));

    // A second run finds the downloads in place and fetches nothing.
    let tally = pipeline::run_details(&settings, Provider::LowerChamber, 2019).unwrap();
    assert_eq!(tally.skipped, 2);
    assert_eq!(downloads.load(Ordering::SeqCst), 2);
}

#[test]
fn lower_chamber_unknown_year() {
    let (base, _) = lower_chamber();
    let data = tempfile::tempdir().unwrap();
    let settings = settings(&base, data.path());
    let err = pipeline::run_listing(&settings, Provider::LowerChamber, 1990).unwrap_err();
    assert!(matches!(err, Error::YearNotFound(1990)), "{err:?}");
    assert!(!data.path().join("lower-chamber/1990.json").exists());
}

#[test]
fn a_broken_detail_page_does_not_stop_the_year() {
    let (base, _) = lower_chamber();
    let data = tempfile::tempdir().unwrap();
    let store = Store::new(data.path());
    let mut broken = VotingSummary::new(3, "Ley C", "EN GENERAL", "AFIRMATIVO");
    broken.details_url = Some(format!("{base}/votacion/3"));
    let mut working = VotingSummary::new(1, "Ley A", "EN GENERAL", "AFIRMATIVO");
    working.details_url = Some(format!("{base}/votacion/1"));
    store
        .save_votings(Provider::LowerChamber, 2019, &[broken, working])
        .unwrap();

    let settings = settings(&base, data.path());
    let tally = pipeline::run_details(&settings, Provider::LowerChamber, 2019).unwrap();
    assert_eq!(
        tally,
        Tally {
            continued: 1,
            skipped: 0,
            aborted: 1
        }
    );
    let saved = store.load_votings(Provider::LowerChamber, 2019).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].affirmative_count, None);
    assert_eq!(saved[1].affirmative_count, Some(2));
}

/// A detail page that moved: `/votacion/9` redirects to a folder whose page
/// links its document and CSV relative to itself.
async fn moved_detail(uri: Uri) -> Response {
    match uri.path() {
        "/votacion/9" => Redirect::temporary("/actas/2019/9/").into_response(),
        "/actas/2019/9/" => {
            let link = r#"<a title="Descargar datos en CSV" href="votos.csv">CSV</a>"#;
            let page = detail_page("9", [2, 0, 0, 0], link).replace("/pdf/9.pdf", "acta.pdf");
            Html(page).into_response()
        }
        "/actas/2019/9/votos.csv" => (
            [(header::CONTENT_DISPOSITION, "attachment; filename=\"votacion-9.csv\"")],
            lower_csv("1"),
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

#[test]
fn detail_links_resolve_against_the_redirected_page() {
    let base = serve(Router::new().fallback(moved_detail));
    let data = tempfile::tempdir().unwrap();
    let store = Store::new(data.path());
    let mut voting = VotingSummary::new(9, "Ley D", "EN GENERAL", "AFIRMATIVO");
    voting.details_url = Some(format!("{base}/votacion/9"));
    store
        .save_votings(Provider::LowerChamber, 2019, &[voting])
        .unwrap();

    let settings = settings(&base, data.path());
    let tally = pipeline::run_details(&settings, Provider::LowerChamber, 2019).unwrap();
    assert_eq!(tally.continued, 1);
    let saved = store.load_votings(Provider::LowerChamber, 2019).unwrap();
    assert_eq!(saved[0].document_url, Some(format!("{base}/actas/2019/9/acta.pdf")));
    assert!(store.exists("lower-chamber/votes/9/votacion-9.csv"));
}

// Upper chamber

fn upper_row(id: u32, date: &str, result: &str) -> String {
    format!(
        r#"<tr>
            <td><span>{date}</span></td>
            <td>{id}</td>
            <td>Votación {id}</td>
            <td>EN GENERAL</td>
            <td><div>{result}</div></td>
            <td><a href="/votaciones/verActaVotacion/{id}">Acta</a></td>
            <td><a href="/votaciones/detalleActa/{id}">Detalle</a></td>
            <td></td>
        </tr>"#
    )
}

fn upper_results(rows: &str, next: &str) -> String {
    format!(
        r#"<html><body>
            <form method="post" action="/votaciones/actas">
                <input type="hidden" name="busqueda_actas[anio]" value="2019">
                <select name="actasTable_length">
                    <option value="10">10</option>
                    <option value="100">100</option>
                </select>
            </form>
            <table id="actasTable"><tbody>{rows}</tbody></table>
            {next}
        </body></html>"#
    )
}

const UPPER_SEARCH: &str = r#"<html><body>
    <form method="post" action="/votaciones/actas">
        <select id="busqueda_actas_anio" name="busqueda_actas[anio]">
            <option value="2020" selected>2020</option>
            <option value="2019">2019</option>
        </select>
        <input type="submit" value="Buscar" title="Realizar Búsqueda">
    </form>
</body></html>"#;

fn senator_row(id: u32, name: &str, vote: &str) -> String {
    format!(
        r#"<tr>
            <td><img src="/fotos/{id}.gif"></td>
            <td><a href="/senadores/senador/{id}">{name}</a></td>
            <td>UCR</td>
            <td>BUENOS AIRES</td>
            <td>{vote}</td>
            <td></td>
        </tr>"#
    )
}

fn upper_detail(id: &str) -> Option<String> {
    let (counts, rows) = match id {
        "2231" => (
            [1, 1, 0, 0],
            senator_row(1, "ABAD, Juan", "SI") + &senator_row(2, "BLANCO, Ana", "NO"),
        ),
        "2232" => (
            [2, 0, 0, 0],
            senator_row(1, "ABAD, Juan", "SI") + &senator_row(2, "BLANCO, Ana", "SI"),
        ),
        "2233" => ([0, 0, 0, 0], String::new()),
        _ => return None,
    };
    let table = format!(
        r#"<select name="detalleActaTable_length">
               <option value="10">10</option>
               <option value="-1">Todos</option>
           </select>
           <table id="detalleActaTable"><tbody>{rows}</tbody></table>"#
    );
    Some(detail_page(id, counts, &table))
}

async fn upper_site(method: Method, uri: Uri, body: String) -> Response {
    let path = uri.path();
    if path == "/votaciones/actas" {
        if method == Method::POST {
            let rows = if body.contains("=2019") {
                upper_row(2231, "20191127", "AFIRMATIVO")
                    + &upper_row(2232, "20191128", "LEV. VOT.")
            } else {
                String::new()
            };
            let next = r#"<a id="actasTable_next" class="paginate_button next"
                href="/votaciones/actas?page=2">Siguiente</a>"#;
            return Html(upper_results(&rows, next)).into_response();
        }
        if uri.query() == Some("page=2") {
            let next =
                r#"<a id="actasTable_next" class="paginate_button next disabled">Siguiente</a>"#;
            let rows = upper_row(2233, "20191204", "NEGATIVO");
            return Html(upper_results(&rows, next)).into_response();
        }
        return Html(UPPER_SEARCH).into_response();
    }
    match path.strip_prefix("/votaciones/detalleActa/").and_then(upper_detail) {
        Some(page) => Html(page).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[test]
fn upper_chamber_paginated_listing_then_details() {
    let base = serve(Router::new().fallback(upper_site));
    let data = tempfile::tempdir().unwrap();
    let settings = settings(&base, data.path());
    let store = Store::new(data.path());

    let votings = pipeline::run_listing(&settings, Provider::UpperChamber, 2019).unwrap();
    let ids: Vec<u64> = votings.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![2231, 2232, 2233]);
    assert_eq!(votings[1].result, "LEV. VOT.");
    assert_eq!(votings[2].date.as_deref(), Some("2019-12-04T00:00:00.000Z"));
    assert!(!store.exists("upper-chamber/records/2019-records.json"));

    let tally = pipeline::run_details(&settings, Provider::UpperChamber, 2019).unwrap();
    assert_eq!(
        tally,
        Tally {
            continued: 2,
            skipped: 1,
            aborted: 0
        }
    );
    let votes = store.load_votes(Provider::UpperChamber, 2019, 2231).unwrap().unwrap();
    assert_eq!(votes.len(), 2);
    assert_eq!(votes[0].legislator_id.as_deref(), Some("1"));
    assert_eq!(votes[0].photo_url, Some(format!("{base}/fotos/1.gif")));
    assert_eq!(votes[1].vote, "NO");
    assert_eq!(store.load_votes(Provider::UpperChamber, 2019, 2233).unwrap(), None);

    let saved = store.load_votings(Provider::UpperChamber, 2019).unwrap();
    assert_eq!(saved[0].affirmative_count, Some(1));
    assert_eq!(saved[0].record, Some(2231));
}

#[test]
fn a_failed_listing_page_keeps_the_rows_already_read() {
    async fn second_page_fails(method: Method, uri: Uri, body: String) -> Response {
        if uri.query() == Some("page=2") {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        upper_site(method, uri, body).await
    }
    let base = serve(Router::new().fallback(second_page_fails));
    let data = tempfile::tempdir().unwrap();
    let store = Store::new(data.path());

    let settings = settings(&base, data.path());
    let votings = pipeline::run_listing(&settings, Provider::UpperChamber, 2019).unwrap();
    let ids: Vec<u64> = votings.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![2231, 2232]);
    let saved = store.load_votings(Provider::UpperChamber, 2019).unwrap();
    assert_eq!(saved.len(), 2);
}

// Import API

type Received = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

async fn import_api(
    State(received): State<Received>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let mut received = received.lock().unwrap();
    received.push((uri.path().to_string(), auth, body));
    let id = received.len();
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

#[test]
fn import_client_posts_json_with_bearer_token() {
    let received: Received = Arc::default();
    let base = serve(Router::new().fallback(import_api).with_state(received.clone()));
    let client = ApiClient::new(&ApiSettings {
        uri: Some(format!("{base}/")),
        token: Some("secret".into()),
        accept_invalid_certs: false,
    })
    .unwrap();

    let response = client
        .post_json("api/import/ar/deputies/voting", &json!({ "id": 1 }))
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.remote_id().as_deref(), Some("1"));

    let received = received.lock().unwrap();
    assert_eq!(received[0].0, "/api/import/ar/deputies/voting");
    assert_eq!(received[0].1.as_deref(), Some("Bearer secret"));
    assert_eq!(received[0].2, json!({ "id": 1 }));
}

#[test]
fn scraped_year_reaches_the_import_api() {
    let (site, _) = lower_chamber();
    let received: Received = Arc::default();
    let api = serve(Router::new().fallback(import_api).with_state(received.clone()));
    let data = tempfile::tempdir().unwrap();
    let mut settings = settings(&site, data.path());
    settings.api.uri = Some(api);

    pipeline::run_listing(&settings, Provider::LowerChamber, 2019).unwrap();
    pipeline::run_details(&settings, Provider::LowerChamber, 2019).unwrap();

    let client = ApiClient::new(&settings.api).unwrap();
    let store = Store::new(&settings.data_dir);
    let options = ImportOptions::default();
    let tally =
        pipeline::run_import(&client, &store, Provider::LowerChamber, 2019, &options).unwrap();
    assert_eq!(tally.continued, 2);

    let paths: Vec<String> = received.lock().unwrap().iter().map(|(p, _, _)| p.clone()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/import/ar/deputies/voting",
            "/api/import/ar/deputies/voting/1/records",
            "/api/import/ar/deputies/voting/1/votes",
            "/api/import/ar/deputies/voting",
            "/api/import/ar/deputies/voting/4/records",
            "/api/import/ar/deputies/voting/4/votes",
        ]
    );
}
