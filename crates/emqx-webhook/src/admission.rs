//! AdmissionReview endpoints
//!
//! Bridges the Kubernetes API server to the [`Defaulter`] and [`Validator`]
//! implementations. Mutating endpoints answer with a JSON patch from the
//! submitted object to its defaulted form; validating endpoints allow or deny.
//! Requests that cannot be handled at all get an `InvalidRequest` status.

use crate::defaulter::Defaulter;
use crate::emqx::{EmqxKind, EmqxObject};
use crate::error::{Result, WebhookError};
use crate::validation::Validator;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Metrics for the admission endpoints
#[derive(Clone)]
pub struct AdmissionMetrics {
    /// Counter for admission reviews received
    pub requests: metrics::Counter,
    /// Counter for denied or invalid reviews
    pub denied: metrics::Counter,
    /// Histogram for review handling duration
    pub duration: metrics::Histogram,
}

impl AdmissionMetrics {
    /// Create new admission metrics
    pub fn new() -> Self {
        Self {
            requests: metrics::counter!("emqx_webhook_admission_requests_total"),
            denied: metrics::counter!("emqx_webhook_admission_denied_total"),
            duration: metrics::histogram!("emqx_webhook_admission_duration_seconds"),
        }
    }
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handler state
#[derive(Clone, Default)]
pub struct AdmissionState {
    pub metrics: AdmissionMetrics,
}

/// Which admission phase an endpoint serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mutate,
    Validate,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Mutate => "mutate",
            Phase::Validate => "validate",
        }
    }
}

/// Webhook path for a phase and kind, e.g.
/// `/validate-apps-emqx-io-v1beta3-emqxenterprise`
pub fn webhook_path(phase: Phase, kind: EmqxKind) -> String {
    format!(
        "/{}-apps-emqx-io-v1beta3-{}",
        phase.as_str(),
        kind.path_segment()
    )
}

/// Build the admission router
pub fn router(state: Arc<AdmissionState>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));

    for kind in [EmqxKind::Broker, EmqxKind::Enterprise] {
        for phase in [Phase::Mutate, Phase::Validate] {
            router = router.route(
                &webhook_path(phase, kind),
                post(
                    move |State(state): State<Arc<AdmissionState>>,
                          Json(review): Json<AdmissionReview<DynamicObject>>| async move {
                        Json(review_response(&state, phase, kind, review))
                    },
                ),
            );
        }
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Answer one AdmissionReview
pub fn review_response(
    state: &AdmissionState,
    phase: Phase,
    kind: EmqxKind,
    review: AdmissionReview<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let start = Instant::now();
    state.metrics.requests.increment(1);

    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!(error = %err, "invalid admission review");
            state.metrics.denied.increment(1);
            return AdmissionResponse::invalid(err.to_string()).into_review();
        }
    };

    let result = match phase {
        Phase::Mutate => mutate(kind, &req),
        Phase::Validate => validate(kind, &req),
    };

    let res = match result {
        Ok(res) => res,
        Err(err) => {
            warn!(
                kind = %kind,
                name = %req.name,
                operation = ?req.operation,
                error = %err,
                "admission request could not be handled"
            );
            let mut res = AdmissionResponse::invalid(err.to_string());
            res.types = req.types.clone();
            res.uid = req.uid.clone();
            res
        }
    };

    if !res.allowed {
        state.metrics.denied.increment(1);
    }
    state
        .metrics
        .duration
        .record(start.elapsed().as_secs_f64());

    res.into_review()
}

fn check_kind(kind: EmqxKind, req: &AdmissionRequest<DynamicObject>) -> Result<()> {
    if req.kind.kind != kind.as_str() {
        return Err(WebhookError::InvalidRequest(format!(
            "expected kind {}, got {}",
            kind, req.kind.kind
        )));
    }
    Ok(())
}

fn decode(kind: EmqxKind, obj: Option<&DynamicObject>, field: &str) -> Result<EmqxObject> {
    let obj = obj.ok_or_else(|| {
        WebhookError::InvalidRequest(format!("admission request has no {}", field))
    })?;
    EmqxObject::from_dynamic(kind, obj)
}

/// JSON patch turning `submitted` into the defaulted form of `emqx`, its
/// decoded counterpart.
///
/// The diff runs over the typed representation and is then anchored onto
/// `submitted`, so every operation applies to the document as received.
pub fn default_patch(submitted: &Value, mut emqx: EmqxObject) -> Result<json_patch::Patch> {
    let before = emqx.to_value()?;
    emqx.apply_defaults();
    let after = emqx.to_value()?;
    anchor_patch(submitted, json_patch::diff(&before, &after))
}

/// Prefix each operation with `add {}` for any parent missing from `doc`
fn anchor_patch(doc: &Value, patch: json_patch::Patch) -> Result<json_patch::Patch> {
    let mut doc = doc.clone();
    let mut ops = Vec::with_capacity(patch.len());

    for op in patch.0 {
        let path = serde_json::to_value(&op)?["path"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let segments: Vec<&str> = path.split('/').skip(1).collect();

        let mut parent = String::new();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            parent.push('/');
            parent.push_str(segment);
            let present = doc
                .pointer(&parent)
                .is_some_and(|v| v.is_object() || v.is_array());
            if !present {
                let add: json_patch::PatchOperation =
                    serde_json::from_value(json!({ "op": "add", "path": &parent, "value": {} }))?;
                apply_op(&mut doc, &add)?;
                ops.push(add);
            }
        }

        apply_op(&mut doc, &op)?;
        ops.push(op);
    }

    Ok(json_patch::Patch(ops))
}

fn apply_op(doc: &mut Value, op: &json_patch::PatchOperation) -> Result<()> {
    json_patch::patch(doc, std::slice::from_ref(op)).map_err(|e| WebhookError::Patch(e.to_string()))
}

/// Default the submitted object and answer with the resulting JSON patch
pub fn mutate(kind: EmqxKind, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    check_kind(kind, req)?;
    let res = AdmissionResponse::from(req);

    if !matches!(req.operation, Operation::Create | Operation::Update) {
        return Ok(res);
    }

    let obj = decode(kind, req.object.as_ref(), "object")?;
    let submitted = serde_json::to_value(&req.object)?;
    let patch = default_patch(&submitted, obj)?;
    debug!(
        kind = %kind,
        name = %req.name,
        operations = patch.0.len(),
        "defaulted"
    );

    res.with_patch(patch)
        .map_err(|e| WebhookError::Patch(e.to_string()))
}

/// Run the validation entry point matching the request operation
pub fn validate(
    kind: EmqxKind,
    req: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionResponse> {
    check_kind(kind, req)?;
    let res = AdmissionResponse::from(req);

    let outcome = match req.operation {
        Operation::Create => decode(kind, req.object.as_ref(), "object")?.validate_create(),
        Operation::Update => {
            let new = decode(kind, req.object.as_ref(), "object")?;
            let old = decode(kind, req.old_object.as_ref(), "oldObject")?;
            new.validate_update(&old)
        }
        Operation::Delete => match decode(kind, req.old_object.as_ref(), "oldObject") {
            Ok(old) => old.validate_delete(),
            Err(err) => {
                debug!(error = %err, "delete without decodable object");
                Ok(())
            }
        },
        _ => Ok(()),
    };

    match outcome {
        Ok(()) => {
            info!(kind = %kind, name = %req.name, operation = ?req.operation, "accepted");
            Ok(res)
        }
        Err(err) if err.is_rejection() => {
            warn!(
                kind = %kind,
                name = %req.name,
                operation = ?req.operation,
                reason = %err,
                "denied"
            );
            Ok(res.deny(err.to_string()))
        }
        Err(err) => Err(err),
    }
}
