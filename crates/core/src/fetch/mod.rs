//! HTTP page loading for the scraping browser: retrying fetches, form
//! submission data, and the errors shared by `Browser` and `Page`.

use crate::dom::{self, DomNode};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, RETRY_AFTER, USER_AGENT};
use std::thread;
use std::time::Duration;
use url::Url;

mod session;

pub use session::{Browser, BrowserConfig, Diagnostic, DiagnosticLevel, DiagnosticSink, Page};

/// Statuses worth another attempt when loading a page.
const TRANSIENT_STATUSES: &[u16] = &[403, 408, 429, 500, 502, 503, 504];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not launch browser: {0}")]
    Launch(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status} for {url}")]
    HttpError { status: u16, url: String },
    #[error("no element matches `{0}`")]
    NoSuchElement(String),
    #[error("option `{value}` not available in `{selector}`")]
    OptionNotFound { selector: String, value: String },
    #[error("{0}")]
    ActionError(String),
    #[error("could not write download {path}: {source}")]
    Download {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Fetch a page body, retrying transient failures with backoff.
pub(crate) fn fetch_html_with_retry(
    client: &Client,
    url: &Url,
    attempts: usize,
    base_delay_ms: u64,
) -> Result<(String, String), FetchError> {
    send_with_retry(attempts, base_delay_ms, || client.get(url.as_str()).send(), url)
}

/// Submit form data, retrying transient failures with backoff.
/// Returns the final URL (after redirects) and the body.
pub(crate) fn submit_with_retry(
    client: &Client,
    user_agent: &str,
    target: &Url,
    method: &str,
    form_data: &[(String, String)],
    attempts: usize,
    base_delay_ms: u64,
) -> Result<(String, String), FetchError> {
    send_with_retry(
        attempts,
        base_delay_ms,
        || {
            if method == "post" {
                client
                    .post(target.as_str())
                    .header(USER_AGENT, user_agent)
                    .form(form_data)
                    .send()
            } else {
                client
                    .get(target.as_str())
                    .header(USER_AGENT, user_agent)
                    .query(form_data)
                    .send()
            }
        },
        target,
    )
}

fn send_with_retry(
    retry_attempts: usize,
    base_delay_ms: u64,
    send: impl Fn() -> reqwest::Result<Response>,
    url: &Url,
) -> Result<(String, String), FetchError> {
    let max_attempts = retry_attempts + 1;
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let response = send().map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let final_url = response.url().to_string();
            let body = response
                .text()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            return Ok((final_url, body));
        }

        if TRANSIENT_STATUSES.contains(&status.as_u16()) && attempt < max_attempts {
            let retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
            let delay = retry_delay_ms(base_delay_ms, attempt - 1, retry_after);
            tracing::debug!(%url, status = status.as_u16(), delay, "retrying page load");
            thread::sleep(Duration::from_millis(delay));
            continue;
        }

        return Err(FetchError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
}

fn retry_delay_ms(base_ms: u64, attempt: usize, retry_after_secs: Option<u64>) -> u64 {
    let base = base_ms.max(50);
    let exp = 1u64 << attempt.min(6);
    let mut delay = base.saturating_mul(exp).min(30_000);
    if let Some(secs) = retry_after_secs {
        delay = delay.max(secs.saturating_mul(1000));
    }
    delay
}

fn parse_retry_after(value: &reqwest::header::HeaderValue) -> Option<u64> {
    let s = value.to_str().ok()?;
    s.trim().parse::<u64>().ok()
}

/// File name announced by a download response, falling back to the last
/// URL path segment.
pub(crate) fn download_file_name(response: &Response) -> String {
    let from_header = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(content_disposition_file_name);
    from_header
        .or_else(|| {
            response
                .url()
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "download.csv".to_string())
}

fn content_disposition_file_name(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let part = part.trim();
        let name = part.strip_prefix("filename=")?;
        let name = name.trim_matches('"').trim();
        // Never let a server pick a directory for us
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    })
}

/// Whether a link target leads nowhere a plain HTTP client can follow.
pub(crate) fn is_inert_href(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
}

/// A form ready to submit: method, action and encoded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub method: String,
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

/// Build the submission for `form`, overlaying `chosen` values (by field
/// name) and including the `trigger` button when it carries a name.
pub fn form_submission(
    form: &DomNode,
    chosen: &std::collections::HashMap<String, String>,
    trigger: Option<&DomNode>,
) -> FormSubmission {
    let mut fields: Vec<(String, String)> = Vec::new();

    for field in form.select("input, select, textarea") {
        let name = match field.get_attr("name") {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        if field.get_attr("disabled").is_some() {
            continue;
        }
        let value = match field.tag.as_str() {
            "select" => chosen
                .get(name)
                .cloned()
                .or_else(|| selected_option_value(field)),
            "textarea" => Some(chosen.get(name).cloned().unwrap_or_else(|| field.text_content())),
            _ => {
                let input_type = field.get_attr("type").unwrap_or("text").to_lowercase();
                match input_type.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => None,
                    "checkbox" | "radio" => {
                        if field.get_attr("checked").is_some() {
                            Some(field.get_attr("value").unwrap_or("on").to_string())
                        } else {
                            None
                        }
                    }
                    _ => Some(
                        chosen
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| field.get_attr("value").unwrap_or("").to_string()),
                    ),
                }
            }
        };
        if let Some(value) = value {
            fields.push((name.to_string(), value));
        }
    }

    if let Some(button) = trigger {
        if let Some(name) = button.get_attr("name").filter(|n| !n.is_empty()) {
            let value = button
                .get_attr("value")
                .map(|v| v.to_string())
                .unwrap_or_else(|| button.text_content());
            fields.push((name.to_string(), value));
        }
    }

    let action = trigger
        .and_then(|b| b.get_attr("formaction"))
        .or_else(|| form.get_attr("action"))
        .map(|a| a.to_string());

    FormSubmission {
        method: form.get_attr("method").unwrap_or("get").to_lowercase(),
        action,
        fields,
    }
}

/// Value of the `selected` option of a select, or its first option.
pub fn selected_option_value(select: &DomNode) -> Option<String> {
    let options = select.select("option");
    options
        .iter()
        .find(|o| o.get_attr("selected").is_some())
        .or_else(|| options.first())
        .map(|o| option_value(o))
}

/// An option's submitted value: its `value` attribute, else its text.
pub fn option_value(option: &DomNode) -> String {
    option
        .get_attr("value")
        .map(|v| v.to_string())
        .unwrap_or_else(|| dom::normalize_whitespace(&option.text_content()))
}

/// Replace (or append) one query parameter, keeping the others.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(name, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn retry_delay_grows_and_honors_retry_after() {
        assert_eq!(retry_delay_ms(100, 0, None), 100);
        assert_eq!(retry_delay_ms(100, 2, None), 400);
        assert_eq!(retry_delay_ms(100, 0, Some(3)), 3000);
        assert_eq!(retry_delay_ms(10, 0, None), 50);
    }

    #[test]
    fn content_disposition_names_are_sanitized() {
        assert_eq!(
            content_disposition_file_name(r#"attachment; filename="votacion-12.csv""#),
            Some("votacion-12.csv".to_string())
        );
        assert_eq!(
            content_disposition_file_name("attachment; filename=../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(content_disposition_file_name("inline"), None);
    }

    #[test]
    fn form_submission_overlays_chosen_values() {
        let doc = dom::parse_html(
            r#"<form method="POST" action="/actas">
                <select name="busqueda_actas[anio]">
                    <option value="2018">2018</option>
                    <option value="2019" selected>2019</option>
                </select>
                <input type="hidden" name="token" value="abc">
                <input type="checkbox" name="todos">
                <input type="submit" name="buscar" value="Buscar" title="Realizar Búsqueda">
            </form>"#,
        );
        let form = doc.select_first("form").unwrap();
        let button = doc.select_first("input[type=submit]").unwrap();

        let untouched = form_submission(form, &HashMap::new(), None);
        assert_eq!(untouched.method, "post");
        assert_eq!(untouched.action.as_deref(), Some("/actas"));
        assert_eq!(
            untouched.fields,
            vec![
                ("busqueda_actas[anio]".to_string(), "2019".to_string()),
                ("token".to_string(), "abc".to_string()),
            ]
        );

        let mut chosen = HashMap::new();
        chosen.insert("busqueda_actas[anio]".to_string(), "2018".to_string());
        let submitted = form_submission(form, &chosen, Some(button));
        assert_eq!(submitted.fields[0].1, "2018");
        assert_eq!(submitted.fields.last().unwrap(), &("buscar".to_string(), "Buscar".to_string()));
    }

    #[test]
    fn query_param_is_replaced_not_duplicated() {
        let url = Url::parse("https://example.org/actas?anio=2018&x=1").unwrap();
        let out = with_query_param(&url, "anio", "2019");
        assert_eq!(out.as_str(), "https://example.org/actas?x=1&anio=2019");
    }

    #[test]
    fn inert_hrefs() {
        assert!(is_inert_href("#"));
        assert!(is_inert_href("javascript:void(0)"));
        assert!(!is_inert_href("/expedientes/12"));
    }
}
