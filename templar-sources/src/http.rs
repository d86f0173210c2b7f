//! HTTP access and the `regex_url_content` template function.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tera::Value;

use templar_core::Namespace;
use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

use crate::error::SourceError;

/// Blocking GET access to upstream documents.
pub trait Fetcher: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, SourceError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

pub(crate) fn http_err(url: &str, detail: impl ToString) -> SourceError {
    SourceError::Http {
        url: url.to_string(),
        detail: detail.to_string(),
    }
}

/// [`Fetcher`] backed by a shared `ureq` agent.
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("templar/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    fn get(&self, url: &str) -> Result<ureq::Response, SourceError> {
        tracing::debug!(url, "fetching");
        self.agent.get(url).call().map_err(|e| http_err(url, e))
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for UreqFetcher {
    fn get_text(&self, url: &str) -> Result<String, SourceError> {
        self.get(url)?.into_string().map_err(|e| http_err(url, e))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let mut body = Vec::new();
        self.get(url)?
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| http_err(url, e))?;
        Ok(body)
    }
}

/// First capture group of `regex` in the document at `url`.
pub fn regex_url_content(fetcher: &dyn Fetcher, url: &str, regex: &str) -> Result<String, SourceError> {
    let re = Regex::new(regex)?;
    let body = fetcher.get_text(url)?;
    re.captures(&body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SourceError::NoMatch {
            url: url.to_string(),
        })
}

/// Hash from a `sha256sum`-style file: the first field, lowercased, which
/// must be non-empty hexadecimal.
pub fn download_hash(fetcher: &dyn Fetcher, url: &str) -> Result<String, SourceError> {
    let body = fetcher.get_text(url)?;
    let hash = body
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SourceError::InvalidChecksum {
            url: url.to_string(),
            hash,
        });
    }
    Ok(hash)
}

/// Provides `regex_url_content(name, url, regex)`.
pub struct HttpSource {
    fetcher: Arc<dyn Fetcher>,
}

impl HttpSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl FunctionSource for HttpSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let fetcher = Arc::clone(&self.fetcher);
        vec![TemplateFunction::new(
            "regex_url_content",
            ResultKind::Text,
            move |a: &Args| {
                let name = args::string(a, "regex_url_content", "name")?;
                let url = args::string(a, "regex_url_content", "url")?;
                let regex = args::string(a, "regex_url_content", "regex")?;
                let content = regex_url_content(fetcher.as_ref(), &url, &regex)?;
                sink.record(&Namespace::RegexUrl.material(&name), &content);
                Ok(Value::from(content))
            },
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{str_args, RecordingSink, StaticFetcher};

    #[test]
    fn first_capture_group_is_returned() {
        let fetcher = StaticFetcher::new().with_text("https://x/", "release v2.7.6 (stable) v2.8.0-beta");
        let got = regex_url_content(&fetcher, "https://x/", r"v(\d+\.\d+\.\d+) \(stable\)").unwrap();
        assert_eq!(got, "2.7.6");
    }

    #[test]
    fn invalid_regex_fails_before_fetching() {
        let fetcher = StaticFetcher::new();
        let err = regex_url_content(&fetcher, "https://x/", "(").unwrap_err();
        assert!(matches!(err, SourceError::Regex(_)));
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn no_match_is_an_error() {
        let fetcher = StaticFetcher::new().with_text("https://x/", "nothing here");
        let err = regex_url_content(&fetcher, "https://x/", r"v(\d+)").unwrap_err();
        assert!(matches!(err, SourceError::NoMatch { .. }));
    }

    #[test]
    fn hash_is_first_field_and_lowercased() {
        let fetcher = StaticFetcher::new().with_text("https://x/sum", "ABCDEF0123  postgresql-16.2.tar.bz2\n");
        assert_eq!(download_hash(&fetcher, "https://x/sum").unwrap(), "abcdef0123");
    }

    #[test]
    fn non_hex_hash_is_rejected() {
        let fetcher = StaticFetcher::new().with_text("https://x/sum", "<html>not found</html>");
        assert!(matches!(
            download_hash(&fetcher, "https://x/sum"),
            Err(SourceError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn function_records_regexurl_material() {
        let fetcher = Arc::new(StaticFetcher::new().with_text("https://caddy/", "version=2.7.6;"));
        let sink = Arc::new(RecordingSink::default());
        let functions = HttpSource::new(fetcher).functions(sink.clone());
        let args = str_args(&[
            ("name", "caddy"),
            ("url", "https://caddy/"),
            ("regex", r"version=([\d.]+);"),
        ]);

        assert_eq!(functions[0].call(&args).unwrap(), Value::from("2.7.6"));
        assert_eq!(sink.get("regexurl:caddy").as_deref(), Some("2.7.6"));
    }
}
