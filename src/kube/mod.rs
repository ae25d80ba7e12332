//! Kubernetes access: objects by reference, secrets, database credentials
//! and plural resource names.
//!
//! The event handler only talks to the cluster through [`ClusterAccess`] and
//! [`SecretSource`], so it can be exercised without a cluster.

pub mod types;

use std::future::Future;
use std::time::Duration;

use ::kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use ::kube::{Client, Config};
use k8s_openapi::api::core::v1::Secret;
use log::{debug, warn};
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::chart::Credentials;

pub use types::{
    ChartCredentials, ChartInfo, CompositionDefinition, DatabaseConfig, NamespacedName,
    ObjectReference, PluralNames, SecretKeySelector, split_api_version,
};

/// DatabaseConfig coordinates.
const DATABASE_CONFIG_API_VERSION: &str = "finops.krateo.io/v1";
const DATABASE_CONFIG_KIND: &str = "DatabaseConfig";
const DATABASE_CONFIG_RESOURCE: &str = "databaseconfigs";

/// Error type for cluster access.
#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    #[error("Failed to infer Kubernetes config: {0}")]
    Config(#[from] ::kube::config::InferConfigError),

    #[error("Failed to create Kubernetes client: {0}")]
    Client(#[from] ::kube::Error),

    #[error("Unable to retrieve {reference}: {source}")]
    ObjectFetch {
        reference: String,
        #[source]
        source: ::kube::Error,
    },

    #[error("Unable to read secret {namespace}/{name}: {source}")]
    SecretFetch {
        namespace: String,
        name: String,
        #[source]
        source: ::kube::Error,
    },

    #[error("Key '{key}' not found in secret {namespace}/{name}")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("Invalid apiVersion '{0}'")]
    InvalidApiVersion(String),

    #[error("Unable to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Pluralizer client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, KubeError>;

/// Read access to arbitrary cluster objects.
pub trait ClusterAccess {
    fn get_object(
        &self,
        reference: &ObjectReference,
    ) -> impl Future<Output = Result<DynamicObject>> + Send;
}

/// Read access to secret values.
pub trait SecretSource {
    fn get_secret_value(
        &self,
        selector: &SecretKeySelector,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// [`ClusterAccess`] and [`SecretSource`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Connect using in-cluster config or the local kubeconfig.
    pub async fn infer() -> Result<Self> {
        let config = Config::infer().await?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ClusterAccess for KubeClient {
    async fn get_object(&self, reference: &ObjectReference) -> Result<DynamicObject> {
        let (group, version) = split_api_version(&reference.api_version)?;
        let gvk = GroupVersionKind::gvk(group, version, &reference.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &reference.resource);

        let api: Api<DynamicObject> = if reference.namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), &reference.namespace, &resource)
        };

        debug!("Fetching {}", reference);
        api.get(&reference.name)
            .await
            .map_err(|source| KubeError::ObjectFetch {
                reference: reference.to_string(),
                source,
            })
    }
}

impl SecretSource for KubeClient {
    async fn get_secret_value(&self, selector: &SecretKeySelector) -> Result<String> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &selector.namespace);
        let secret = secrets
            .get(&selector.name)
            .await
            .map_err(|source| KubeError::SecretFetch {
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                source,
            })?;

        secret_value(&secret, &selector.key).ok_or_else(|| KubeError::SecretKeyMissing {
            namespace: selector.namespace.clone(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        })
    }
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .cloned()
        })
}

/// Decode a dynamic object into a typed view of it.
pub fn decode<T: DeserializeOwned>(object: &DynamicObject) -> Result<T> {
    let kind = object
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_else(|| "object".to_string());
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|source| KubeError::Decode { kind, source })
}

/// Username and password of the configured DatabaseConfig.
pub async fn database_credentials<C>(cluster: &C, config: &NamespacedName) -> Result<Credentials>
where
    C: ClusterAccess + SecretSource + ?Sized,
{
    let reference = ObjectReference {
        api_version: DATABASE_CONFIG_API_VERSION.to_string(),
        kind: DATABASE_CONFIG_KIND.to_string(),
        resource: DATABASE_CONFIG_RESOURCE.to_string(),
        name: config.name.clone(),
        namespace: config.namespace.clone(),
    };

    let object = cluster.get_object(&reference).await?;
    let database_config: DatabaseConfig = decode(&object)?;
    let password = cluster
        .get_secret_value(&database_config.spec.password_secret_ref)
        .await?;

    Ok(Credentials::new(database_config.spec.username, password))
}

/// Maps `{apiVersion, kind}` to the plural resource name through an HTTP
/// pluralizer service.
#[derive(Debug, Clone)]
pub struct Pluralizer {
    client: reqwest::Client,
    url: Option<String>,
}

impl Pluralizer {
    /// `url` of `None` always uses the naive fallback.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }

    /// Plural resource name for `kind`, falling back to lowercase `kind` + `s`.
    pub async fn plural(&self, api_version: &str, kind: &str) -> String {
        let Some(url) = &self.url else {
            return naive_plural(kind);
        };

        match self.query(url, api_version, kind).await {
            Ok(names) if !names.plural.is_empty() => names.plural,
            Ok(_) => {
                warn!("Pluralizer returned no plural for {} {}", api_version, kind);
                naive_plural(kind)
            }
            Err(e) => {
                warn!("Pluralizer lookup for {} {} failed: {}", api_version, kind, e);
                naive_plural(kind)
            }
        }
    }

    async fn query(&self, url: &str, api_version: &str, kind: &str) -> std::result::Result<PluralNames, String> {
        let mut url = Url::parse(url).map_err(|e| format!("invalid pluralizer URL '{url}': {e}"))?;
        url.query_pairs_mut()
            .append_pair("apiVersion", api_version)
            .append_pair("kind", kind);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("pluralizer status: {status}"));
        }

        response.json::<PluralNames>().await.map_err(|e| e.to_string())
    }
}

fn naive_plural(kind: &str) -> String {
    format!("{}s", kind.to_lowercase())
}
