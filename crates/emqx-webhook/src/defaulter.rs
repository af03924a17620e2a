//! Mutation phase: fill unset fields with the operator's defaults

use crate::crd::{EmqxBroker, EmqxEnterprise};
use crate::emqx::{Emqx, EmqxObject};
use k8s_openapi::api::core::v1::PodSecurityContext;
use kube::ResourceExt;
use tracing::debug;

/// Label marking resources managed by the operator
pub const MANAGED_BY_LABEL: &str = "apps.emqx.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "emqx-operator";

/// Label carrying the owning instance name
pub const INSTANCE_LABEL: &str = "apps.emqx.io/instance";

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "public";

/// Non-root uid/gid the EMQX image runs as
pub const EMQX_USER_GROUP: i64 = 1000;

/// Fills unset fields of a resource in place. Never fails.
pub trait Defaulter {
    fn apply_defaults(&mut self);
}

impl Defaulter for EmqxBroker {
    fn apply_defaults(&mut self) {
        default_emqx(self);
    }
}

impl Defaulter for EmqxEnterprise {
    fn apply_defaults(&mut self) {
        default_emqx(self);
    }
}

impl Defaulter for EmqxObject {
    fn apply_defaults(&mut self) {
        match self {
            EmqxObject::Broker(emqx) => emqx.apply_defaults(),
            EmqxObject::Enterprise(emqx) => emqx.apply_defaults(),
        }
    }
}

/// Security context applied when the submitter supplied none
pub fn default_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_user: Some(EMQX_USER_GROUP),
        run_as_group: Some(EMQX_USER_GROUP),
        fs_group: Some(EMQX_USER_GROUP),
        fs_group_change_policy: Some("Always".to_string()),
        supplemental_groups: Some(vec![EMQX_USER_GROUP]),
        ..Default::default()
    }
}

fn default_emqx<E: Emqx>(emqx: &mut E) {
    let name = emqx.name_any();
    debug!(name = %name, "default");

    // Reserved keys are always overwritten
    let labels = emqx.labels_mut();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(INSTANCE_LABEL.to_string(), name);

    let mut config = emqx.template_mut().emqx_config.take().unwrap_or_default();
    config.apply_defaults(&*emqx);
    emqx.template_mut().emqx_config = Some(config);

    let mut service_template = std::mem::take(&mut emqx.template_mut().service_template);
    service_template.apply_defaults(&*emqx);
    emqx.template_mut().service_template = service_template;

    let template = emqx.template_mut();
    if template.security_context.is_none() {
        template.security_context = Some(default_security_context());
    }
    if template.username.is_empty() {
        template.username = DEFAULT_USERNAME.to_string();
    }
    if template.password.is_empty() {
        template.password = DEFAULT_PASSWORD.to_string();
    }
}
