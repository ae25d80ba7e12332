//! HTTP routes:
//! - `GET /` - liveness
//! - `POST /handle` - Kubernetes event webhook

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use k8s_openapi::api::core::v1::Event;
use log::{debug, error};
use serde_json::json;

use crate::chart::ChartSource;
use crate::handlers::EventDispatcher;
use crate::kube::{ClusterAccess, SecretSource};
use crate::notebook::Reporter;

/// Liveness endpoint.
pub async fn home() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Decode an event from the request body and dispatch it.
pub async fn handle_event<C, R, S>(
    State(dispatcher): State<Arc<EventDispatcher<C, R, S>>>,
    body: Bytes,
) -> Response
where
    C: ClusterAccess + SecretSource + Send + Sync + 'static,
    R: Reporter + Send + Sync + 'static,
    S: ChartSource + Send + Sync + 'static,
{
    debug!("Received event on /handle");

    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!("Error parsing event JSON: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid event: {e}") })),
            )
                .into_response();
        }
    };

    let reason = event.reason.clone().unwrap_or_default();
    match dispatcher.dispatch(&event).await {
        Ok(outcome) => (StatusCode::OK, Json(json!({ "status": outcome.status() }))).into_response(),
        Err(e) => {
            error!("Error while handling {} event: {}", reason, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Error while handling {reason} event: {e}") })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartReference, Credentials};
    use crate::handlers::DispatchSettings;
    use crate::kube::{KubeError, NamespacedName, ObjectReference, Pluralizer, SecretKeySelector};
    use crate::notebook::Operation;
    use ::kube::api::DynamicObject;
    use std::time::Duration;

    /// A cluster that has nothing in it.
    struct EmptyCluster;

    impl ClusterAccess for EmptyCluster {
        async fn get_object(&self, reference: &ObjectReference) -> crate::kube::Result<DynamicObject> {
            Err(KubeError::InvalidApiVersion(reference.api_version.clone()))
        }
    }

    impl SecretSource for EmptyCluster {
        async fn get_secret_value(&self, selector: &SecretKeySelector) -> crate::kube::Result<String> {
            Err(KubeError::SecretKeyMissing {
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                key: selector.key.clone(),
            })
        }
    }

    struct NoReporter;

    impl Reporter for NoReporter {
        async fn report(
            &self,
            _operation: Operation,
            _composition_id: &str,
            _json_list: &str,
            _credentials: &Credentials,
        ) -> crate::notebook::Result<()> {
            Ok(())
        }
    }

    struct NoCharts;

    impl ChartSource for NoCharts {
        async fn fetch(&self, reference: &ChartReference) -> crate::chart::Result<Vec<u8>> {
            Err(crate::chart::ChartError::ReferenceInvalid(reference.uri.clone()))
        }
    }

    fn dispatcher() -> Arc<EventDispatcher<EmptyCluster, NoReporter, NoCharts>> {
        Arc::new(EventDispatcher::new(
            EmptyCluster,
            NoReporter,
            NoCharts,
            Pluralizer::new(None, Duration::from_secs(1)).unwrap(),
            DispatchSettings {
                annotation_key: "krateo-finops-focus-resource".to_string(),
                database_config: NamespacedName {
                    name: "db".to_string(),
                    namespace: "krateo-system".to_string(),
                },
                work_dir: std::env::temp_dir(),
            },
        ))
    }

    fn event(api_version: &str, kind: &str, reason: &str) -> Bytes {
        Bytes::from(
            json!({
                "apiVersion": "v1",
                "kind": "Event",
                "metadata": { "name": "evt", "namespace": "demo" },
                "reason": reason,
                "involvedObject": {
                    "apiVersion": api_version,
                    "kind": kind,
                    "name": "fireworks",
                    "namespace": "demo",
                    "uid": "7c3b5c0e-uid"
                }
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn test_home() {
        let response = home().await;
        assert_eq!(response.0["status"], "ok");
    }

    #[tokio::test]
    async fn test_unrelated_event_is_ignored() {
        let response = handle_event(
            State(dispatcher()),
            event("apps/v1", "Deployment", "CreatedExternalResource"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bad_body_is_400() {
        let response = handle_event(State(dispatcher()), Bytes::from_static(b"{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_500() {
        let response = handle_event(
            State(dispatcher()),
            event("core.krateo.io/v1alpha1", "CompositionDefinition", "DeletedExternalResource"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
