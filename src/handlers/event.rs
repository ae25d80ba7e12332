//! Handling of CompositionDefinition events.
//!
//! A `CreatedExternalResource` event downloads the definition's chart, counts
//! the FinOps resources its templates declare and reports them to the
//! notebook. A `DeletedExternalResource` event asks the notebook to drop them.

use std::path::PathBuf;

use k8s_openapi::api::core::v1::Event;
use log::{debug, error, info, warn};

use crate::chart::{self, ChartError, ChartReference, ChartSource, Credentials, ResourceOccurrences};
use crate::error::{ParserError, Result};
use crate::kube::{
    ChartInfo, ClusterAccess, CompositionDefinition, NamespacedName, ObjectReference, Pluralizer,
    SecretSource, database_credentials, decode, split_api_version,
};
use crate::notebook::{Operation, Reporter};

/// Group and kind of the objects whose events are handled.
pub const COMPOSITION_DEFINITION_GROUP: &str = "core.krateo.io";
pub const COMPOSITION_DEFINITION_KIND: &str = "CompositionDefinition";

pub const REASON_CREATED: &str = "CreatedExternalResource";
pub const REASON_DELETED: &str = "DeletedExternalResource";

/// Settings shared by every dispatch.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Annotation key scanned for in chart templates.
    pub annotation_key: String,
    /// DatabaseConfig holding the notebook credentials.
    pub database_config: NamespacedName,
    /// Parent of the per-event extraction directories.
    pub work_dir: PathBuf,
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Chart scanned and results reported.
    Created(ResourceOccurrences),
    /// Results removed from the notebook.
    Deleted,
    /// Event not relevant to this service.
    Ignored,
}

impl DispatchOutcome {
    /// Short status string for HTTP replies.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Created(_) | Self::Deleted => "processed",
            Self::Ignored => "ignored",
        }
    }
}

/// Turns cluster events into chart scans and notebook calls.
pub struct EventDispatcher<C, R, S> {
    cluster: C,
    reporter: R,
    source: S,
    pluralizer: Pluralizer,
    settings: DispatchSettings,
}

impl<C, R, S> EventDispatcher<C, R, S>
where
    C: ClusterAccess + SecretSource + Sync,
    R: Reporter + Sync,
    S: ChartSource + Sync,
{
    pub fn new(cluster: C, reporter: R, source: S, pluralizer: Pluralizer, settings: DispatchSettings) -> Self {
        Self {
            cluster,
            reporter,
            source,
            pluralizer,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Handle one event.
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchOutcome> {
        let involved = &event.involved_object;
        let api_version = involved.api_version.as_deref().unwrap_or_default();
        let kind = involved.kind.as_deref().unwrap_or_default();

        if !is_composition_definition(api_version, kind) {
            debug!("Ignoring event for {} {}", api_version, kind);
            return Ok(DispatchOutcome::Ignored);
        }

        let reason = event.reason.as_deref().unwrap_or_default();
        if reason != REASON_CREATED && reason != REASON_DELETED {
            debug!("Ignoring '{}' event for {} {}", reason, api_version, kind);
            return Ok(DispatchOutcome::Ignored);
        }

        let composition_id = involved
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| ParserError::InvalidEvent("involvedObject.uid is missing".to_string()))?;
        info!(
            "Event {} received for composition definition {}",
            reason, composition_id
        );

        let reference = ObjectReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            resource: self.pluralizer.plural(api_version, kind).await,
            name: involved.name.clone().unwrap_or_default(),
            namespace: involved.namespace.clone().unwrap_or_default(),
        };

        let credentials = database_credentials(&self.cluster, &self.settings.database_config)
            .await
            .inspect_err(|e| error!("Error while retrieving database username and password: {}", e))?;

        info!("'{}' event for composition definition {}", reason, reference);

        if reason == REASON_DELETED {
            self.reporter
                .report(Operation::Delete, composition_id, "{}", &credentials)
                .await?;
            return Ok(DispatchOutcome::Deleted);
        }

        let occurrences = self.process_chart(&reference).await?;
        let json_list = occurrences.to_json()?;
        self.reporter
            .report(Operation::Create, composition_id, &json_list, &credentials)
            .await?;

        Ok(DispatchOutcome::Created(occurrences))
    }

    /// Fetch the CompositionDefinition and scan its chart in a fresh directory.
    async fn process_chart(&self, reference: &ObjectReference) -> Result<ResourceOccurrences> {
        let object = self.cluster.get_object(reference).await?;
        let definition: CompositionDefinition = decode(&object)?;
        let chart_reference = chart_reference(&definition.spec.chart, &self.cluster).await?;

        std::fs::create_dir_all(&self.settings.work_dir)?;
        // removed on drop, whatever the outcome
        let work_dir = tempfile::Builder::new()
            .prefix("chart-")
            .tempdir_in(&self.settings.work_dir)?;

        let occurrences = chart::run(
            &self.source,
            &chart_reference,
            work_dir.path(),
            &self.settings.annotation_key,
        )
        .await?;

        Ok(occurrences)
    }
}

/// Whether the event concerns a CompositionDefinition.
pub fn is_composition_definition(api_version: &str, kind: &str) -> bool {
    match split_api_version(api_version) {
        Ok((group, _)) => group == COMPOSITION_DEFINITION_GROUP && kind == COMPOSITION_DEFINITION_KIND,
        Err(e) => {
            warn!("Could not parse group version from '{}': {}", api_version, e);
            false
        }
    }
}

/// Build a [`ChartReference`] from a CompositionDefinition's chart section,
/// reading the password secret when credentials are declared.
pub async fn chart_reference<S>(info: &ChartInfo, secrets: &S) -> chart::Result<ChartReference>
where
    S: SecretSource + ?Sized,
{
    let mut reference = ChartReference::new(info.url.clone()).insecure_skip_tls(info.insecure_skip_verify_tls);
    if let Some(repo) = &info.repo {
        reference = reference.with_repository(repo.clone());
    }
    if let Some(version) = &info.version {
        reference = reference.with_version(version.clone());
    }

    if let Some(creds) = &info.credentials {
        let password = secrets
            .get_secret_value(&creds.password_ref)
            .await
            .map_err(|e| ChartError::SecretUnavailable(e.to_string()))?;
        reference = reference.with_credentials(Credentials::new(creds.username.clone(), password));
    }

    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::{ChartCredentials, KubeError, SecretKeySelector};

    struct StaticSecrets(Option<&'static str>);

    impl SecretSource for StaticSecrets {
        async fn get_secret_value(&self, selector: &SecretKeySelector) -> crate::kube::Result<String> {
            self.0.map(str::to_string).ok_or_else(|| KubeError::SecretKeyMissing {
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                key: selector.key.clone(),
            })
        }
    }

    fn chart_info(credentials: bool) -> ChartInfo {
        ChartInfo {
            url: "https://charts.krateo.io".to_string(),
            repo: Some("fireworks-app".to_string()),
            version: Some("1.1.13".to_string()),
            insecure_skip_verify_tls: true,
            credentials: credentials.then(|| ChartCredentials {
                username: "bot".to_string(),
                password_ref: SecretKeySelector {
                    name: "repo-creds".to_string(),
                    namespace: "krateo-system".to_string(),
                    key: "password".to_string(),
                },
            }),
        }
    }

    #[test]
    fn test_filter() {
        assert!(is_composition_definition("core.krateo.io/v1alpha1", "CompositionDefinition"));
        assert!(!is_composition_definition("core.krateo.io/v1alpha1", "Composition"));
        assert!(!is_composition_definition("composition.krateo.io/v1", "CompositionDefinition"));
        assert!(!is_composition_definition("", "CompositionDefinition"));
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(DispatchOutcome::Deleted.status(), "processed");
        assert_eq!(DispatchOutcome::Created(ResourceOccurrences::new()).status(), "processed");
        assert_eq!(DispatchOutcome::Ignored.status(), "ignored");
    }

    #[tokio::test]
    async fn test_chart_reference_without_credentials() {
        let reference = chart_reference(&chart_info(false), &StaticSecrets(None)).await.unwrap();

        assert_eq!(reference.uri, "https://charts.krateo.io");
        assert_eq!(reference.repository_name(), Some("fireworks-app"));
        assert_eq!(reference.version(), Some("1.1.13"));
        assert!(reference.insecure_skip_tls);
        assert!(reference.credentials.is_none());
    }

    #[tokio::test]
    async fn test_chart_reference_reads_secret() {
        let reference = chart_reference(&chart_info(true), &StaticSecrets(Some("hunter2")))
            .await
            .unwrap();

        assert_eq!(reference.credentials, Some(Credentials::new("bot", "hunter2")));
    }

    #[tokio::test]
    async fn test_chart_reference_secret_unavailable() {
        let err = chart_reference(&chart_info(true), &StaticSecrets(None)).await.unwrap_err();
        assert!(matches!(err, ChartError::SecretUnavailable(_)));
    }
}
