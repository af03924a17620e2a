//! Capability interface shared by the EMQX resource variants
//!
//! Defaulting and validation are written against the [`Emqx`] trait rather
//! than a concrete CRD type. [`EmqxObject`] is the closed set of variants
//! the admission endpoints dispatch on.

use crate::crd::{EmqxBroker, EmqxEnterprise, EmqxTemplate, License};
use crate::error::Result;
use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use kube::core::DynamicObject;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Common accessors over `EmqxBroker` and `EmqxEnterprise`
pub trait Emqx: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned {
    /// Shared pod template
    fn template(&self) -> &EmqxTemplate;

    /// Mutable access to the shared pod template
    fn template_mut(&mut self) -> &mut EmqxTemplate;

    /// Enterprise license, if the variant has one
    fn license(&self) -> Option<&License> {
        None
    }

    fn username(&self) -> &str {
        &self.template().username
    }

    fn password(&self) -> &str {
        &self.template().password
    }

    fn persistent(&self) -> Option<&PersistentVolumeClaimSpec> {
        self.template().persistent.as_ref()
    }

    fn image(&self) -> &str {
        &self.template().image
    }
}

impl Emqx for EmqxBroker {
    fn template(&self) -> &EmqxTemplate {
        &self.spec.emqx_template
    }

    fn template_mut(&mut self) -> &mut EmqxTemplate {
        &mut self.spec.emqx_template
    }
}

impl Emqx for EmqxEnterprise {
    fn template(&self) -> &EmqxTemplate {
        &self.spec.emqx_template.template
    }

    fn template_mut(&mut self) -> &mut EmqxTemplate {
        &mut self.spec.emqx_template.template
    }

    fn license(&self) -> Option<&License> {
        Some(&self.spec.emqx_template.license)
    }
}

/// Resource kinds served by the webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmqxKind {
    Broker,
    Enterprise,
}

impl EmqxKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            EmqxKind::Broker => "EmqxBroker",
            EmqxKind::Enterprise => "EmqxEnterprise",
        }
    }

    /// Lowercase resource name used in webhook paths
    pub fn path_segment(&self) -> &'static str {
        match self {
            EmqxKind::Broker => "emqxbroker",
            EmqxKind::Enterprise => "emqxenterprise",
        }
    }
}

impl fmt::Display for EmqxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded EMQX resource of either variant
#[derive(Debug, Clone, PartialEq)]
pub enum EmqxObject {
    Broker(EmqxBroker),
    Enterprise(EmqxEnterprise),
}

impl EmqxObject {
    /// Decode an untyped admission object into the variant for `kind`
    pub fn from_dynamic(kind: EmqxKind, obj: &DynamicObject) -> Result<Self> {
        let value = serde_json::to_value(obj)?;
        let decoded = match kind {
            EmqxKind::Broker => EmqxObject::Broker(serde_json::from_value(value)?),
            EmqxKind::Enterprise => EmqxObject::Enterprise(serde_json::from_value(value)?),
        };
        Ok(decoded)
    }

    pub fn kind(&self) -> EmqxKind {
        match self {
            EmqxObject::Broker(_) => EmqxKind::Broker,
            EmqxObject::Enterprise(_) => EmqxKind::Enterprise,
        }
    }

    pub fn name(&self) -> String {
        match self {
            EmqxObject::Broker(emqx) => emqx.name_any(),
            EmqxObject::Enterprise(emqx) => emqx.name_any(),
        }
    }

    /// Serialize back to JSON
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            EmqxObject::Broker(emqx) => serde_json::to_value(emqx)?,
            EmqxObject::Enterprise(emqx) => serde_json::to_value(emqx)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EmqxBrokerSpec, EmqxEnterpriseSpec};
    use serde_json::json;

    fn dynamic(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_broker_accessors() {
        let mut broker = EmqxBroker::new("emqx", EmqxBrokerSpec::default());
        broker.spec.emqx_template.username = "user".to_string();
        broker.spec.emqx_template.image = "emqx/emqx:4.4.8".to_string();

        assert_eq!(broker.username(), "user");
        assert_eq!(broker.password(), "");
        assert_eq!(broker.image(), "emqx/emqx:4.4.8");
        assert!(broker.persistent().is_none());
        assert!(broker.license().is_none());
    }

    #[test]
    fn test_enterprise_exposes_license() {
        let mut enterprise = EmqxEnterprise::new("emqx-ee", EmqxEnterpriseSpec::default());
        enterprise.spec.emqx_template.license.secret_name = "s".to_string();
        assert_eq!(enterprise.license().unwrap().secret_name, "s");
    }

    #[test]
    fn test_from_dynamic() {
        let obj = dynamic(json!({
            "apiVersion": "apps.emqx.io/v1beta3",
            "kind": "EmqxEnterprise",
            "metadata": { "name": "emqx-ee", "namespace": "default" },
            "spec": { "emqxTemplate": { "image": "emqx/emqx-ee:4.4.8" } }
        }));

        let decoded = EmqxObject::from_dynamic(EmqxKind::Enterprise, &obj).unwrap();
        assert_eq!(decoded.kind(), EmqxKind::Enterprise);
        assert_eq!(decoded.name(), "emqx-ee");
    }

    #[test]
    fn test_from_dynamic_rejects_bad_shape() {
        let obj = dynamic(json!({
            "apiVersion": "apps.emqx.io/v1beta3",
            "kind": "EmqxBroker",
            "metadata": { "name": "emqx" },
            "spec": { "emqxTemplate": { "image": 42 } }
        }));

        assert!(EmqxObject::from_dynamic(EmqxKind::Broker, &obj).is_err());
    }
}
