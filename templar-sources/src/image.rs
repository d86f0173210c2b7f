//! Container image digests from OCI distribution registries.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use serde::Deserialize;
use tera::Value;

use templar_core::{is_qualified_reference, Credentials, Namespace};
use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

use crate::error::{upstream_err, SourceError};
use crate::http::http_err;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.oci.image.manifest.v1+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Resolves an image reference to its current manifest digest (`sha256:...`).
pub trait DigestProvider: Send + Sync {
    fn digest(&self, reference: &str) -> Result<String, SourceError>;
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// An image reference split into the parts the distribution API needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    /// Tag or `sha256:` digest.
    pub reference: String,
}

impl ImageReference {
    /// Split `reference`, resolving unqualified names against `default_registry`.
    pub fn parse(reference: &str, default_registry: &str) -> Self {
        let (registry, remainder) = if is_qualified_reference(reference) {
            // Qualified references always contain a '/'.
            reference.split_once('/').unwrap_or((default_registry, reference))
        } else {
            (default_registry, reference)
        };

        let (name, tag) = if let Some((name, digest)) = remainder.split_once('@') {
            (name, digest)
        } else {
            match remainder.rsplit_once(':') {
                Some((name, tag)) if !tag.contains('/') => (name, tag),
                _ => (remainder, "latest"),
            }
        };

        let (registry, repository) = if registry == "docker.io" {
            let repository = if name.contains('/') {
                name.to_string()
            } else {
                format!("library/{name}")
            };
            ("registry-1.docker.io".to_string(), repository)
        } else {
            (registry.to_string(), name.to_string())
        };

        Self {
            registry,
            repository,
            reference: tag.to_string(),
        }
    }

    pub fn manifest_url(&self) -> String {
        format!(
            "https://{}/v2/{}/manifests/{}",
            self.registry, self.repository, self.reference
        )
    }
}

// ---------------------------------------------------------------------------
// Token authentication
// ---------------------------------------------------------------------------

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let re = Regex::new(r#"(\w+)="([^"]*)""#).ok()?;
        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for caps in re.captures_iter(params) {
            let value = caps[2].to_string();
            match &caps[1] {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// [`DigestProvider`] speaking the OCI distribution API over `ureq`.
pub struct RegistryClient {
    agent: ureq::Agent,
    default_registry: String,
    credentials: Credentials,
}

impl RegistryClient {
    pub fn new(agent: ureq::Agent, default_registry: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            agent,
            default_registry: default_registry.into(),
            credentials,
        }
    }

    fn head(&self, url: &str, token: Option<&str>) -> Result<ureq::Response, ureq::Error> {
        let mut request = self.agent.head(url).set("Accept", MANIFEST_ACCEPT);
        if let Some(token) = token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request.call()
    }

    fn token(&self, image: &ImageReference, challenge: &BearerChallenge) -> Result<String, SourceError> {
        let auth_err = |detail: String| SourceError::RegistryAuth {
            registry: image.registry.clone(),
            detail,
        };

        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository));
        let mut request = self.agent.get(&challenge.realm).query("scope", &scope);
        if let Some(service) = &challenge.service {
            request = request.query("service", service);
        }
        if let Some(creds) = self.credentials.non_empty() {
            let basic = BASE64.encode(format!("{}:{}", creds.username, creds.password));
            request = request.set("Authorization", &format!("Basic {basic}"));
        }

        let response: TokenResponse = request
            .call()
            .map_err(|e| auth_err(e.to_string()))?
            .into_json()
            .map_err(|e| auth_err(e.to_string()))?;

        match (response.token, response.access_token) {
            (token, _) if !token.is_empty() => Ok(token),
            (_, token) if !token.is_empty() => Ok(token),
            _ => Err(auth_err("token response had no token".to_string())),
        }
    }
}

fn digest_header(url: &str, response: &ureq::Response) -> Result<String, SourceError> {
    response
        .header(DIGEST_HEADER)
        .map(str::to_string)
        .ok_or_else(|| upstream_err(url, format!("missing {DIGEST_HEADER} header")))
}

impl DigestProvider for RegistryClient {
    fn digest(&self, reference: &str) -> Result<String, SourceError> {
        let image = ImageReference::parse(reference, &self.default_registry);
        let url = image.manifest_url();
        tracing::debug!(reference, url = %url, "resolving image digest");

        match self.head(&url, None) {
            Ok(response) => digest_header(&url, &response),
            Err(ureq::Error::Status(401, response)) => {
                let challenge = response
                    .header("WWW-Authenticate")
                    .and_then(BearerChallenge::parse)
                    .ok_or_else(|| SourceError::RegistryAuth {
                        registry: image.registry.clone(),
                        detail: "unsupported authentication challenge".to_string(),
                    })?;
                let token = self.token(&image, &challenge)?;
                let response = self
                    .head(&url, Some(&token))
                    .map_err(|e| http_err(&url, e))?;
                digest_header(&url, &response)
            }
            Err(e) => Err(http_err(&url, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageSource
// ---------------------------------------------------------------------------

/// Provides `registry()` and `image(ref)`.
pub struct ImageSource {
    registry: String,
    digests: Arc<dyn DigestProvider>,
}

impl ImageSource {
    pub fn new(registry: impl Into<String>, digests: Arc<dyn DigestProvider>) -> Self {
        Self {
            registry: registry.into(),
            digests,
        }
    }
}

impl FunctionSource for ImageSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let registry = self.registry.clone();
        let digests = Arc::clone(&self.digests);
        let registry_value = Value::from(self.registry.clone());

        vec![
            TemplateFunction::new("registry", ResultKind::Text, move |_: &Args| {
                Ok(registry_value.clone())
            }),
            TemplateFunction::new("image", ResultKind::Text, move |a: &Args| {
                let reference = args::string(a, "image", "ref")?;
                let digest = digests.digest(&reference)?;
                let image = if is_qualified_reference(&reference) {
                    reference.clone()
                } else {
                    format!("{registry}/{reference}")
                };
                let recorded = digest.strip_prefix("sha256:").unwrap_or(&digest);
                sink.record(&Namespace::Image.material(&reference), recorded);
                Ok(Value::from(format!("{image}@{digest}")))
            }),
        ]
    }
}
