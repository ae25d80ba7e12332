//! Chart source resolution.
//!
//! Turns a [`ChartReference`] into raw `.tgz` bytes. Three strategies exist,
//! selected purely from the shape of the reference URI:
//!
//! | Kind | URI shape | Strategy |
//! |------|-----------|----------|
//! | [`SourceKind::Oci`] | `oci://host/repo[:tag]` | registry pull (see [`super::oci`]) |
//! | [`SourceKind::Tarball`] | ends in `.tgz` / `.tar.gz` | direct HTTP(S) download |
//! | [`SourceKind::RepositoryIndex`] | anything else | `index.yaml` lookup, then download |

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, Url};

use super::error::{ChartError, Result};
use super::index::RepositoryIndex;
use super::oci;
use super::reference::{ChartReference, Credentials};

/// User agent for chart downloads
const USER_AGENT: &str = concat!("finops-cd-parser/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce the archive bytes of a chart.
pub trait ChartSource {
    fn fetch(&self, reference: &ChartReference) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Resolution strategy for a chart reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Oci,
    Tarball,
    RepositoryIndex,
}

impl SourceKind {
    /// Classify a reference URI. Pure; performs no I/O.
    pub fn classify(uri: &str) -> Self {
        let uri = uri.trim();
        if uri.get(..6).is_some_and(|scheme| scheme.eq_ignore_ascii_case("oci://")) {
            return Self::Oci;
        }

        let path = uri.split(['?', '#']).next().unwrap_or(uri).to_ascii_lowercase();
        if path.ends_with(".tgz") || path.ends_with(".tar.gz") {
            Self::Tarball
        } else {
            Self::RepositoryIndex
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oci => write!(f, "oci"),
            Self::Tarball => write!(f, "tarball"),
            Self::RepositoryIndex => write!(f, "repository index"),
        }
    }
}

/// HTTP-backed [`ChartSource`] implementing all three strategies.
#[derive(Debug, Clone)]
pub struct ChartFetcher {
    client: Client,
    insecure_client: Client,
    registry_scheme: &'static str,
}

impl ChartFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let insecure_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            insecure_client,
            registry_scheme: "https",
        })
    }

    /// Talk to OCI registries over plain HTTP instead of HTTPS.
    pub fn with_plain_http_registries(mut self, plain_http: bool) -> Self {
        self.registry_scheme = if plain_http { "http" } else { "https" };
        self
    }

    fn client_for(&self, reference: &ChartReference) -> &Client {
        if reference.insecure_skip_tls {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    async fn fetch_from_index(
        &self,
        client: &Client,
        base_url: &str,
        reference: &ChartReference,
    ) -> Result<Vec<u8>> {
        let name = reference.repository_name().ok_or_else(|| {
            ChartError::ReferenceInvalid(format!(
                "repository name is required to resolve {base_url} through its index"
            ))
        })?;
        let version = reference.version().ok_or_else(|| {
            ChartError::ReferenceInvalid(format!(
                "version is required to resolve {base_url} through its index"
            ))
        })?;

        let base_url = base_url.trim_end_matches('/');
        let index_url = format!("{base_url}/index.yaml");
        let bytes = download(client, &index_url, reference.credentials.as_ref()).await?;
        let content = String::from_utf8_lossy(&bytes);

        let index = RepositoryIndex::parse(&content)?;
        let tarball_url = index.find(name, version)?.tarball_url(base_url)?;
        debug!("Index {} resolved {}@{} to {}", index_url, name, version, tarball_url);

        download(client, &tarball_url, reference.credentials.as_ref()).await
    }
}

impl ChartSource for ChartFetcher {
    async fn fetch(&self, reference: &ChartReference) -> Result<Vec<u8>> {
        let uri = reference.validated_uri()?;
        let kind = SourceKind::classify(uri);
        let client = self.client_for(reference);
        info!("Resolving chart {} via {}", uri, kind);

        let bytes = match kind {
            SourceKind::Oci => oci::pull(client, self.registry_scheme, reference).await?,
            SourceKind::Tarball => {
                parse_http_url(uri)?;
                download(client, uri, reference.credentials.as_ref()).await?
            }
            SourceKind::RepositoryIndex => {
                parse_http_url(uri)?;
                self.fetch_from_index(client, uri, reference).await?
            }
        };

        debug!("Fetched {} bytes for chart {}", bytes.len(), uri);
        Ok(bytes)
    }
}

/// Reject anything that is not an absolute http(s) URL before touching the network.
fn parse_http_url(uri: &str) -> Result<Url> {
    let url = Url::parse(uri)
        .map_err(|e| ChartError::ReferenceInvalid(format!("'{uri}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ChartError::ReferenceInvalid(format!(
            "unsupported URL scheme '{other}' in '{uri}'"
        ))),
    }
}

/// GET `url` and return the body, failing on any non-2xx status.
async fn download(client: &Client, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>> {
    debug!("GET {}", url);
    let mut request = client.get(url);
    if let Some(creds) = credentials {
        request = request.basic_auth(&creds.username, Some(&creds.password));
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ChartError::TransportFailure {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.bytes().await?.to_vec())
}
