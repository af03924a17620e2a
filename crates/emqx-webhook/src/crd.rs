//! Custom Resource Definitions for the EMQX admission webhook
//!
//! This module defines the `EmqxBroker` and `EmqxEnterprise` CRDs. Both share
//! [`EmqxTemplate`]; the enterprise variant adds a [`License`].

use crate::emqx_config::EmqxConfig;
use crate::service_template::ServiceTemplate;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimSpec, PodSecurityContext, ResourceRequirements,
};
use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

/// API group of the EMQX resources
pub const API_GROUP: &str = "apps.emqx.io";

/// API version served by this webhook
pub const API_VERSION: &str = "v1beta3";

/// Serde skip predicate for sub-objects left at their default
pub(crate) fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Read an explicit `null` as the type's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// EmqxBroker custom resource definition
///
/// Represents an open-source EMQX broker cluster.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apps.emqx.io",
    version = "v1beta3",
    kind = "EmqxBroker",
    plural = "emqxbrokers",
    shortname = "emqx",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.emqxTemplate.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EmqxBrokerSpec {
    /// Number of broker replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Broker pod template
    #[serde(default, deserialize_with = "null_as_default")]
    pub emqx_template: EmqxTemplate,
}

/// EmqxEnterprise custom resource definition
///
/// Represents an EMQX Enterprise broker cluster. Identical to `EmqxBroker`
/// apart from the license carried by its template.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apps.emqx.io",
    version = "v1beta3",
    kind = "EmqxEnterprise",
    plural = "emqxenterprises",
    shortname = "emqx-ee",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.emqxTemplate.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EmqxEnterpriseSpec {
    /// Number of broker replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Enterprise broker pod template
    #[serde(default, deserialize_with = "null_as_default")]
    pub emqx_template: EmqxEnterpriseTemplate,
}

/// Pod template shared by both broker variants
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmqxTemplate {
    /// Container image, e.g. `emqx/emqx:4.4.8`
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Dashboard/management username. Immutable after creation.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub username: String,

    /// Dashboard/management password. Immutable after creation.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub password: String,

    /// Broker configuration (`emqx.conf` keys)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emqx_config: Option<EmqxConfig>,

    /// Service exposing the broker listeners
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "is_default"
    )]
    pub service_template: ServiceTemplate,

    /// Pod security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    /// Durable storage. Immutable after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<PersistentVolumeClaimSpec>,

    /// Resource requirements (CPU, memory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Pod template of the enterprise variant
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmqxEnterpriseTemplate {
    #[serde(flatten)]
    pub template: EmqxTemplate,

    /// Enterprise license
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "is_default"
    )]
    pub license: License,
}

/// Enterprise license source
///
/// Either a reference to an existing Secret or inline material, never both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_license_source"))]
pub struct License {
    /// Name of a Secret holding the license
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub secret_name: String,

    /// Inline license material (base64 encoded on the wire)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub data: BTreeMap<String, ByteString>,

    /// Inline license material as plain strings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
}

impl License {
    /// Whether any inline license material is present
    pub fn has_inline_material(&self) -> bool {
        !self.data.is_empty() || !self.string_data.is_empty()
    }
}

/// A secret reference excludes inline material
fn validate_license_source(license: &License) -> Result<(), ValidationError> {
    if !license.secret_name.is_empty() && license.has_inline_material() {
        return Err(ValidationError::new("license_conflict")
            .with_message("SecretName or Data and StringData can only set one".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_metadata() {
        let crd = EmqxBroker::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.kind, "EmqxBroker");
        assert_eq!(crd.spec.versions[0].name, API_VERSION);

        let crd = EmqxEnterprise::crd();
        assert_eq!(crd.spec.names.plural, "emqxenterprises");
    }

    #[test]
    fn test_license_secret_only() {
        let license = License {
            secret_name: "s".to_string(),
            ..Default::default()
        };
        assert!(license.validate().is_ok());
    }

    #[test]
    fn test_license_inline_only() {
        let license = License {
            string_data: BTreeMap::from([("k".to_string(), "v".to_string())]),
            ..Default::default()
        };
        assert!(license.validate().is_ok());
    }

    #[test]
    fn test_license_conflict() {
        let license = License {
            secret_name: "s".to_string(),
            data: BTreeMap::from([("k".to_string(), ByteString(b"v".to_vec()))]),
            ..Default::default()
        };
        assert!(license.validate().is_err());
    }

    #[test]
    fn test_enterprise_template_flattens() {
        let spec: EmqxEnterpriseSpec = serde_json::from_value(serde_json::json!({
            "emqxTemplate": {
                "image": "emqx/emqx-ee:4.4.8",
                "username": "admin",
                "license": { "secretName": "emqx-license" }
            }
        }))
        .unwrap();

        assert_eq!(spec.emqx_template.template.image, "emqx/emqx-ee:4.4.8");
        assert_eq!(spec.emqx_template.template.username, "admin");
        assert_eq!(spec.emqx_template.license.secret_name, "emqx-license");
    }

    #[test]
    fn test_null_strings_read_as_empty() {
        let spec: EmqxBrokerSpec = serde_json::from_value(serde_json::json!({
            "emqxTemplate": {
                "image": "emqx/emqx:4.4.8",
                "username": null,
                "password": null,
                "serviceTemplate": null
            }
        }))
        .unwrap();

        assert!(spec.emqx_template.username.is_empty());
        assert!(spec.emqx_template.password.is_empty());
        assert_eq!(spec.emqx_template.service_template, ServiceTemplate::default());
    }

    #[test]
    fn test_null_template_reads_as_default() {
        let spec: EmqxEnterpriseSpec =
            serde_json::from_value(serde_json::json!({ "emqxTemplate": null })).unwrap();
        assert_eq!(spec.emqx_template, EmqxEnterpriseTemplate::default());
    }

    #[test]
    fn test_untouched_fields_are_not_serialized() {
        let template = EmqxTemplate {
            image: "emqx/emqx:4.4.8".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value, serde_json::json!({ "image": "emqx/emqx:4.4.8" }));
    }
}
