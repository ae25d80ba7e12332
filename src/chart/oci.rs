//! OCI registry pull strategy.
//!
//! Flow:
//! 1. Parse `oci://host/repo[:tag]`; the tag falls back to the reference version
//! 2. Ping `/v2/` and negotiate auth (anonymous, Basic, or Bearer token)
//! 3. Fetch the manifest (an image index is followed to its first manifest)
//! 4. Pick the Helm chart content layer by media type
//! 5. Download the layer blob, which is the chart `.tgz`

use log::debug;
use reqwest::{Client, RequestBuilder};

use super::error::{ChartError, Result};
use super::reference::{ChartReference, Credentials};

const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.oci.image.manifest.v1+json,",
    "application/vnd.docker.distribution.manifest.v2+json,",
    "application/vnd.oci.image.index.v1+json"
);

const HELM_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
const TAR_GZ_MEDIA_TYPE: &str = "application/tar+gzip";

/// How requests to the registry are authenticated.
#[derive(Debug, Clone)]
enum RegistryAuth {
    Anonymous,
    Basic(Credentials),
    Bearer(String),
}

impl RegistryAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Anonymous => request,
            Self::Basic(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            Self::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// Pull the chart archive referenced by an `oci://` URI.
///
/// `scheme` is `"https"` unless the fetcher was told to reach registries over
/// plain HTTP.
pub(crate) async fn pull(client: &Client, scheme: &str, reference: &ChartReference) -> Result<Vec<u8>> {
    let uri = reference.validated_uri()?;
    let (host, repo, uri_tag) = parse_oci_reference(uri)?;
    let tag = uri_tag
        .as_deref()
        .or(reference.version())
        .ok_or_else(|| {
            ChartError::ReferenceInvalid(format!("OCI reference '{uri}' needs a tag or version"))
        })?
        // OCI tags cannot carry '+', Helm pushes semver build metadata with '_'
        .replace('+', "_");

    let base = format!("{scheme}://{host}/v2");
    let auth = authenticate(client, &base, &repo, reference.credentials.as_ref()).await?;
    let manifest = fetch_manifest(client, &base, &repo, &tag, &auth).await?;
    let digest = find_chart_layer_digest(&manifest)?;
    debug!("OCI {}/{}:{} resolved chart layer {}", host, repo, tag, digest);

    download_blob(client, &base, &repo, &digest, &auth).await
}

/// Parse an OCI reference into (host, repository, optional_tag).
///
///   `"oci://registry-1.docker.io/bitnamicharts/redis"`
///     → `("registry-1.docker.io", "bitnamicharts/redis", None)`
///   `"oci://ghcr.io/org/chart:1.0.0"`
///     → `("ghcr.io", "org/chart", Some("1.0.0"))`
fn parse_oci_reference(reference: &str) -> Result<(String, String, Option<String>)> {
    let without_scheme = reference
        .get(..6)
        .filter(|scheme| scheme.eq_ignore_ascii_case("oci://"))
        .map(|_| &reference[6..])
        .ok_or_else(|| ChartError::ReferenceInvalid(format!("not an OCI reference: {reference}")))?;

    let (host, rest) = without_scheme.split_once('/').ok_or_else(|| {
        ChartError::ReferenceInvalid(format!(
            "invalid OCI reference (no path after host): {reference}"
        ))
    })?;

    if host.is_empty() || rest.is_empty() {
        return Err(ChartError::ReferenceInvalid(format!(
            "invalid OCI reference (empty host or path): {reference}"
        )));
    }

    let rest = rest.trim_end_matches('/');
    let (repo, tag) = match rest.rsplit_once(':') {
        Some((r, t)) if !t.contains('/') => (r.to_string(), Some(t.to_string())),
        _ => (rest.to_string(), None),
    };

    Ok((host.to_string(), repo, tag))
}

/// Ping the registry API at `base` (`scheme://host/v2`) and negotiate auth.
async fn authenticate(
    client: &Client,
    base: &str,
    repo: &str,
    credentials: Option<&Credentials>,
) -> Result<RegistryAuth> {
    let ping_url = format!("{base}/");
    let mut ping = client.get(&ping_url);
    if let Some(creds) = credentials {
        ping = ping.basic_auth(&creds.username, Some(&creds.password));
    }
    let ping_resp = ping.send().await?;

    if ping_resp.status().is_success() {
        return Ok(credentials
            .cloned()
            .map(RegistryAuth::Basic)
            .unwrap_or(RegistryAuth::Anonymous));
    }

    if ping_resp.status().as_u16() != 401 {
        return Err(ChartError::TransportFailure {
            url: ping_url,
            status: ping_resp.status().as_u16(),
        });
    }

    let challenge = ping_resp
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ChartError::Registry(format!("{base} returned 401 without WWW-Authenticate"))
        })?
        .to_owned();

    if challenge.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("basic")) {
        return credentials
            .cloned()
            .map(RegistryAuth::Basic)
            .ok_or_else(|| ChartError::Registry(format!("{base} requires credentials")));
    }

    let (realm, service, _scope) = parse_www_authenticate(&challenge).ok_or_else(|| {
        ChartError::Registry(format!("could not parse WWW-Authenticate: {challenge}"))
    })?;

    let mut token_url = format!("{realm}?scope=repository:{repo}:pull");
    if let Some(svc) = service {
        token_url.push_str(&format!("&service={svc}"));
    }

    let mut token_req = client.get(&token_url);
    if let Some(creds) = credentials {
        token_req = token_req.basic_auth(&creds.username, Some(&creds.password));
    }
    let token_resp = token_req.send().await?;
    if !token_resp.status().is_success() {
        return Err(ChartError::TransportFailure {
            url: token_url,
            status: token_resp.status().as_u16(),
        });
    }

    let body: serde_json::Value = token_resp.json().await?;
    let token = body
        .get("token")
        .or_else(|| body.get("access_token"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| ChartError::Registry("no token field in OCI auth response".to_string()))?;

    Ok(RegistryAuth::Bearer(token.to_string()))
}

/// Parse a `WWW-Authenticate: Bearer ...` header value.
///
/// Returns `(realm, service, scope)` where service and scope may be absent.
fn parse_www_authenticate(header: &str) -> Option<(String, Option<String>, Option<String>)> {
    let rest = header.strip_prefix("Bearer ")?;

    let mut realm: Option<String> = None;
    let mut service: Option<String> = None;
    let mut scope: Option<String> = None;

    let mut remaining = rest;
    while !remaining.is_empty() {
        remaining = remaining.trim_start_matches([' ', ',']);
        if remaining.is_empty() {
            break;
        }

        let eq_pos = remaining.find('=')?;
        let key = &remaining[..eq_pos];
        remaining = &remaining[eq_pos + 1..];

        let value = if let Some(quoted) = remaining.strip_prefix('"') {
            let close = quoted.find('"')?;
            let v = quoted[..close].to_string();
            remaining = &quoted[close + 1..];
            v
        } else {
            let end = remaining.find([',', ' ']).unwrap_or(remaining.len());
            let v = remaining[..end].to_string();
            remaining = &remaining[end..];
            v
        };

        match key {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    realm.map(|r| (r, service, scope))
}

/// Fetch the manifest for `tag`, following an image index to its first entry.
async fn fetch_manifest(
    client: &Client,
    base: &str,
    repo: &str,
    tag: &str,
    auth: &RegistryAuth,
) -> Result<serde_json::Value> {
    let mut reference = tag.to_string();

    // An index points at manifests, never at another index we care about.
    for _ in 0..2 {
        let url = format!("{base}/{repo}/manifests/{reference}");
        let resp = auth
            .apply(client.get(&url).header("Accept", MANIFEST_ACCEPT))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ChartError::TransportFailure {
                url,
                status: resp.status().as_u16(),
            });
        }

        let manifest: serde_json::Value = resp.json().await?;
        let Some(manifests) = manifest.get("manifests") else {
            return Ok(manifest);
        };

        reference = manifests
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|entry| entry.get("digest"))
            .and_then(|d| d.as_str())
            .ok_or_else(|| ChartError::Registry("OCI image index has no manifest entries".into()))?
            .to_owned();
    }

    Err(ChartError::Registry(format!(
        "nested OCI image index for {repo}:{tag}"
    )))
}

/// Digest of the Helm chart content layer in an OCI manifest.
fn find_chart_layer_digest(manifest: &serde_json::Value) -> Result<String> {
    let layers = manifest
        .get("layers")
        .and_then(|l| l.as_array())
        .ok_or_else(|| ChartError::Registry("OCI manifest has no 'layers' array".into()))?;

    for media_type in [HELM_LAYER_MEDIA_TYPE, TAR_GZ_MEDIA_TYPE] {
        let digest = layers
            .iter()
            .filter(|layer| layer.get("mediaType").and_then(|t| t.as_str()) == Some(media_type))
            .find_map(|layer| layer.get("digest").and_then(|d| d.as_str()));
        if let Some(digest) = digest {
            return Ok(digest.to_string());
        }
    }

    Err(ChartError::Registry(format!(
        "OCI manifest has no Helm chart content layer (expected media type '{HELM_LAYER_MEDIA_TYPE}')"
    )))
}

async fn download_blob(
    client: &Client,
    base: &str,
    repo: &str,
    digest: &str,
    auth: &RegistryAuth,
) -> Result<Vec<u8>> {
    let url = format!("{base}/{repo}/blobs/{digest}");

    let resp = auth.apply(client.get(&url)).send().await?;
    if !resp.status().is_success() {
        return Err(ChartError::TransportFailure {
            url,
            status: resp.status().as_u16(),
        });
    }

    Ok(resp.bytes().await?.to_vec())
}
