//! Browsing session: a shared HTTP client with cookie persistence, and
//! pages that navigate, choose options, submit forms and download files.

use super::{
    download_file_name, fetch_html_with_retry, form_submission, is_inert_href, option_value,
    submit_with_retry, with_query_param, FetchError,
};
use crate::dom::{self, DomNode, SelectorList};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use url::Url;

/// Configuration for a scraping browser.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Pause before every page action (slow motion).
    pub step_delay_ms: u64,
    /// Forward page diagnostics to the log.
    pub diagnostics: bool,
    /// Production mode logs every diagnostic it forwards; development mode
    /// drops benign resource-load noise.
    pub production: bool,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_redirects: 10,
            step_delay_ms: 0,
            diagnostics: false,
            production: true,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

impl BrowserConfig {
    /// Development runs slowly and chatty; production runs quiet.
    pub fn for_environment(production: bool) -> Self {
        Self {
            step_delay_ms: if production { 0 } else { 100 },
            diagnostics: !production,
            production,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// A message a page reports while it loads: the console of this browser.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub text: String,
}

pub type DiagnosticSink = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// The browser: owns the HTTP client every page shares.
pub struct Browser {
    client: Client,
    config: BrowserConfig,
}

impl Browser {
    /// Launch the browser. Failure here aborts the whole command.
    pub fn start(config: BrowserConfig) -> Result<Self, FetchError> {
        let cookie_store = Arc::new(reqwest::cookie::Jar::default());
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(Policy::limited(config.max_redirects))
            .cookie_provider(cookie_store)
            .build()
            .map_err(|e| FetchError::Launch(e.to_string()))?;
        tracing::debug!(
            step_delay_ms = config.step_delay_ms,
            diagnostics = config.diagnostics,
            "browser started"
        );
        Ok(Self { client, config })
    }

    /// Open a new page with its diagnostics wired to the log.
    pub fn create_page(&self) -> Result<Page, FetchError> {
        tracing::info!("opening new page");
        let mut page = Page::new(self.client.clone(), self.config.clone());
        if self.config.diagnostics {
            page.on_diagnostic(log_sink(self.config.production));
        }
        Ok(page)
    }

    /// Release the browser.
    pub fn finish(self) {
        tracing::debug!("browser finished");
    }
}

/// Forward diagnostics to tracing, dropping resource-load noise outside
/// production.
fn log_sink(production: bool) -> DiagnosticSink {
    Arc::new(move |d: &Diagnostic| {
        if !production && d.text.contains("Failed to load resource") {
            return;
        }
        match d.level {
            DiagnosticLevel::Info => tracing::info!(target: "page", "{}", d.text),
            DiagnosticLevel::Warning => tracing::warn!(target: "page", "{}", d.text),
            DiagnosticLevel::Error => tracing::error!(target: "page", "{}", d.text),
        }
    })
}

/// One browsing context: current URL, parsed document and pending choices.
pub struct Page {
    client: Client,
    config: BrowserConfig,
    current_url: Option<Url>,
    document: Option<DomNode>,
    chosen: HashMap<String, String>,
    download_dir: Option<PathBuf>,
    sink: Option<DiagnosticSink>,
}

impl Page {
    fn new(client: Client, config: BrowserConfig) -> Self {
        Self {
            client,
            config,
            current_url: None,
            document: None,
            chosen: HashMap::new(),
            download_dir: None,
            sink: None,
        }
    }

    /// Receive every diagnostic this page reports.
    pub fn on_diagnostic(&mut self, sink: DiagnosticSink) {
        self.sink = Some(sink);
    }

    fn report(&self, level: DiagnosticLevel, text: String) {
        if let Some(sink) = &self.sink {
            sink(&Diagnostic { level, text });
        }
    }

    fn pause(&self) {
        if self.config.step_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.step_delay_ms));
        }
    }

    /// Navigate to a URL and parse the response.
    pub fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        self.pause();
        let result = fetch_html_with_retry(
            &self.client,
            &parsed,
            self.config.retry_attempts,
            self.config.retry_delay_ms,
        );
        let (final_url, html) = self.observe(result)?;
        self.load_html(&html, &final_url)
    }

    /// Load HTML content directly (without fetching).
    pub fn load_html(&mut self, html: &str, url: &str) -> Result<(), FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        self.document = Some(dom::parse_html(html));
        self.current_url = Some(parsed);
        self.chosen.clear();
        self.report(DiagnosticLevel::Info, format!("loaded {url}"));
        Ok(())
    }

    fn observe<T>(&self, result: Result<T, FetchError>) -> Result<T, FetchError> {
        if let Err(FetchError::HttpError { status, url }) = &result {
            self.report(
                DiagnosticLevel::Error,
                format!(
                    "Failed to load resource: \
                     the server responded with a status of {status} ({url})"
                ),
            );
        }
        result
    }

    pub fn url(&self) -> Option<&str> {
        self.current_url.as_ref().map(|u| u.as_str())
    }

    /// The current document.
    pub fn document(&self) -> Result<&DomNode, FetchError> {
        self.document
            .as_ref()
            .ok_or_else(|| FetchError::ActionError("No page loaded".to_string()))
    }

    /// Resolve a possibly relative URL against the current page.
    pub fn resolve_url(&self, relative: &str) -> String {
        match &self.current_url {
            Some(base) => base
                .join(relative.trim())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| relative.to_string()),
            None => relative.to_string(),
        }
    }

    /// Whether an element matching `selector` exists right now.
    pub fn has(&self, selector: &str) -> bool {
        self.document
            .as_ref()
            .map(|d| d.select_first(selector).is_some())
            .unwrap_or(false)
    }

    /// Like waiting for a selector: the element must be in the document.
    pub fn wait_for(&self, selector: &str) -> Result<&DomNode, FetchError> {
        self.document()?
            .select_first(selector)
            .ok_or_else(|| FetchError::NoSuchElement(selector.to_string()))
    }

    /// Pick `value` in the select matching `selector`. The choice rides on
    /// the next `submit` or `dispatch_change`.
    pub fn choose(&mut self, selector: &str, value: &str) -> Result<(), FetchError> {
        let name = {
            let select = self.wait_for(selector)?;
            if select.tag != "select" {
                return Err(FetchError::ActionError(format!(
                    "`{selector}` ({}) is not a select",
                    select.tag
                )));
            }
            let available = select.select("option").iter().any(|o| option_value(o) == value);
            if !available {
                return Err(FetchError::OptionNotFound {
                    selector: selector.to_string(),
                    value: value.to_string(),
                });
            }
            field_name(select)
        };
        self.chosen.insert(name, value.to_string());
        Ok(())
    }

    /// Fire the change event of a select that reloads the page: submit its
    /// form, or reload the current URL with the choice as a query parameter.
    pub fn dispatch_change(&mut self, selector: &str) -> Result<(), FetchError> {
        let has_form = {
            let doc = self.document()?;
            let select = self.wait_for(selector)?;
            enclosing_form(doc, select).is_some()
        };
        if has_form {
            return self.submit(selector);
        }

        let (name, value) = {
            let select = self.wait_for(selector)?;
            let name = field_name(select);
            let value = self
                .chosen
                .get(&name)
                .cloned()
                .or_else(|| super::selected_option_value(select))
                .unwrap_or_default();
            (name, value)
        };
        let base = self
            .current_url
            .clone()
            .ok_or_else(|| FetchError::ActionError("No URL loaded".to_string()))?;
        let target = with_query_param(&base, &name, &value);
        self.goto(target.as_str())
    }

    /// Submit the form enclosing the element matching `selector`.
    pub fn submit(&mut self, selector: &str) -> Result<(), FetchError> {
        let base = self
            .current_url
            .clone()
            .ok_or_else(|| FetchError::ActionError("No URL loaded".to_string()))?;
        let submission = {
            let doc = self.document()?;
            let trigger = self.wait_for(selector)?;
            let form = enclosing_form(doc, trigger).ok_or_else(|| {
                FetchError::ActionError(format!("`{selector}` is not inside a form"))
            })?;
            let button = matches!(trigger.tag.as_str(), "button" | "input").then_some(trigger);
            form_submission(form, &self.chosen, button)
        };

        let target = base
            .join(submission.action.as_deref().unwrap_or(""))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        self.pause();
        let result = submit_with_retry(
            &self.client,
            &self.config.user_agent,
            &target,
            &submission.method,
            &submission.fields,
            self.config.retry_attempts,
            self.config.retry_delay_ms,
        );
        let (final_url, html) = self.observe(result)?;
        self.load_html(&html, &final_url)
    }

    /// Click a link, or a control wrapping one: navigate to its target.
    pub fn click(&mut self, selector: &str) -> Result<(), FetchError> {
        let element = self.wait_for(selector)?;
        let href = element
            .get_attr("href")
            .map(|h| h.to_string())
            .or_else(|| element.select_attr("a[href]", "href"))
            .ok_or_else(|| FetchError::ActionError(format!("`{selector}` has no href")))?;
        if is_inert_href(&href) {
            return Err(FetchError::ActionError(format!("`{selector}` leads nowhere ({href})")));
        }
        let target = self.resolve_url(&href);
        self.goto(&target)
    }

    /// Load a link's target as a fragment without leaving the page, the way
    /// a "show more" control fetches its panel.
    pub fn reveal(&self, href: &str) -> Result<DomNode, FetchError> {
        if is_inert_href(href) {
            return Err(FetchError::ActionError(format!("nothing to fetch behind `{href}`")));
        }
        let target = self.resolve_url(href);
        let parsed =
            Url::parse(&target).map_err(|e| FetchError::InvalidUrl(format!("{target}: {e}")))?;
        self.pause();
        let result = fetch_html_with_retry(
            &self.client,
            &parsed,
            self.config.retry_attempts,
            self.config.retry_delay_ms,
        );
        let (_, html) = self.observe(result)?;
        Ok(dom::parse_html(&html))
    }

    /// Where the next download lands.
    pub fn set_download_path(&mut self, dir: impl Into<PathBuf>) {
        self.download_dir = Some(dir.into());
    }

    /// Download the file linked by the element matching `selector` into the
    /// download path. Returns the written file.
    pub fn download(&mut self, selector: &str) -> Result<PathBuf, FetchError> {
        let dir = self
            .download_dir
            .clone()
            .ok_or_else(|| FetchError::ActionError("download path not set".to_string()))?;
        let href = self
            .wait_for(selector)?
            .get_attr("href")
            .map(|h| h.to_string())
            .ok_or_else(|| FetchError::ActionError(format!("`{selector}` has no href")))?;
        let target = self.resolve_url(&href);
        self.pause();

        let response = self
            .client
            .get(&target)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return self.observe(Err(FetchError::HttpError {
                status: status.as_u16(),
                url: target,
            }));
        }
        let file_name = download_file_name(&response);
        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let path = write_download(&dir, &file_name, &bytes)?;
        self.report(DiagnosticLevel::Info, format!("downloaded {}", path.display()));
        Ok(path)
    }

    /// Close the page.
    pub fn close(self) {
        tracing::debug!(url = self.url().unwrap_or("about:blank"), "page closed");
    }
}

fn write_download(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, FetchError> {
    let path = dir.join(file_name);
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, bytes))
        .map_err(|source| FetchError::Download {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// A form field's name, falling back to its id.
fn field_name(field: &DomNode) -> String {
    field
        .get_attr("name")
        .or_else(|| field.get_attr("id"))
        .unwrap_or_default()
        .to_string()
}

fn enclosing_form<'a>(doc: &'a DomNode, element: &DomNode) -> Option<&'a DomNode> {
    let form = SelectorList::parse("form")?;
    let ancestors = dom::ancestors_of(doc, element)?;
    ancestors
        .iter()
        .enumerate()
        .rev()
        .find(|(i, node)| form.matches(node, &ancestors[..*i]))
        .map(|(_, node)| *node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Page {
        let browser = Browser::start(BrowserConfig::default()).unwrap();
        browser.create_page().unwrap()
    }

    #[test]
    fn choose_rejects_missing_options() {
        let mut page = page();
        page.load_html(
            r#"<select id="select-ano"><option value="2019">2019</option></select>"#,
            "http://localhost/",
        )
        .unwrap();
        assert!(page.choose("select#select-ano", "2019").is_ok());
        let err = page.choose("select#select-ano", "1990").unwrap_err();
        assert!(matches!(err, FetchError::OptionNotFound { .. }));
    }

    #[test]
    fn click_needs_a_navigable_link() {
        let mut page = page();
        page.load_html(
            r##"<a id="js" href="javascript:void(0)">Ver</a><span id="plain">x</span>
               <li id="wrapped"><a href="#">Siguiente</a></li>"##,
            "http://localhost/",
        )
        .unwrap();
        assert!(matches!(page.click("#js"), Err(FetchError::ActionError(_))));
        assert!(matches!(page.click("#wrapped"), Err(FetchError::ActionError(_))));
        assert!(matches!(page.click("#plain"), Err(FetchError::ActionError(_))));
        assert!(matches!(page.click("#missing"), Err(FetchError::NoSuchElement(_))));
        assert!(matches!(page.download("#plain"), Err(FetchError::ActionError(_))));
    }

    #[test]
    fn finds_enclosing_form() {
        let doc =
            dom::parse_html(r#"<div><form id="f"><span><button>Ir</button></span></form></div>"#);
        let button = doc.select_first("button").unwrap();
        let form = enclosing_form(&doc, button).unwrap();
        assert_eq!(form.get_attr("id"), Some("f"));
    }

    #[test]
    fn resolves_relative_urls_against_current_page() {
        let mut page = page();
        page.load_html("<p>x</p>", "https://www.senado.gov.ar/votaciones/actas").unwrap();
        assert_eq!(
            page.resolve_url("/votaciones/detalleActa/12"),
            "https://www.senado.gov.ar/votaciones/detalleActa/12"
        );
    }

    #[test]
    fn diagnostics_reach_the_sink() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut page = page();
        let sink_seen = seen.clone();
        page.on_diagnostic(Arc::new(move |d: &Diagnostic| {
            sink_seen.lock().unwrap().push(d.text.clone());
        }));
        page.load_html("<p>x</p>", "http://localhost/a").unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["loaded http://localhost/a"]);
    }
}
