//! Service exposing the broker listeners, and its defaults

use crate::crd::is_default;
use crate::emqx::Emqx;
use crate::emqx_config::LISTENER_PORTS;
use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Service template embedded in the broker pod template
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    #[serde(default, skip_serializing_if = "is_default")]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "is_default")]
    pub spec: ServiceSpec,
}

impl ServiceTemplate {
    /// Fill the service identity, selector and listener ports from `owner`.
    ///
    /// Owner labels win over template labels. Existing ports are kept; a
    /// listener port is appended only if neither its number nor its name is
    /// already taken.
    pub fn apply_defaults<E: Emqx>(&mut self, owner: &E) {
        let meta = &mut self.metadata;
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            meta.name = Some(owner.name_any());
        }
        if meta.namespace.as_deref().unwrap_or_default().is_empty() {
            meta.namespace = owner.namespace();
        }

        let owner_labels = owner.labels();
        if !owner_labels.is_empty() {
            let labels = meta.labels.get_or_insert_with(Default::default);
            for (key, value) in owner_labels {
                labels.insert(key.clone(), value.clone());
            }
        }

        let selector_unset = self
            .spec
            .selector
            .as_ref()
            .map_or(true, |selector| selector.is_empty());
        if selector_unset && !owner_labels.is_empty() {
            self.spec.selector = Some(owner_labels.clone());
        }

        let Some(config) = owner.template().emqx_config.as_ref() else {
            return;
        };

        for (key, port_name) in LISTENER_PORTS {
            let Some(port) = config.listener_port(key) else {
                continue;
            };
            let ports = self.spec.ports.get_or_insert_with(Vec::new);
            let taken = ports
                .iter()
                .any(|p| p.port == port || p.name.as_deref() == Some(*port_name));
            if taken {
                continue;
            }
            ports.push(ServicePort {
                name: Some((*port_name).to_string()),
                port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            });
        }
    }
}
