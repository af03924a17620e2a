//! Broker configuration (`emqx.conf` key/value pairs) and its defaults

use crate::emqx::Emqx;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// Namespace assumed when the owning resource has none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Listener config keys exposed through the service, with their port names
pub const LISTENER_PORTS: &[(&str, &str)] = &[
    ("listener.tcp.external", "mqtt"),
    ("listener.ssl.external", "mqtts"),
    ("listener.ws.external", "ws"),
    ("listener.wss.external", "wss"),
    ("management.listener.http", "http-management"),
    ("dashboard.listener.http", "http-dashboard"),
];

/// Keys filled in only when the submitter left them out
const FILL_DEFAULTS: &[(&str, &str)] = &[
    ("listener.tcp.internal", ""),
    ("listener.tcp.external", "1883"),
    ("listener.ssl.external", "8883"),
    ("listener.ws.external", "8083"),
    ("listener.wss.external", "8084"),
    ("management.listener.http", "8081"),
    ("dashboard.listener.http", "18083"),
    ("log.to", "console"),
];

/// EMQX broker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct EmqxConfig(BTreeMap<String, String>);

impl EmqxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the operator's configuration policy for `owner` into this map.
    ///
    /// Cluster discovery keys always follow the owner; listener, dashboard
    /// and log keys are only filled when absent.
    pub fn apply_defaults<E: Emqx>(&mut self, owner: &E) {
        let name = owner.name_any();
        let namespace = owner
            .namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        self.0.insert("name".to_string(), name.clone());
        self.0
            .insert("cluster.discovery".to_string(), "dns".to_string());
        self.0
            .insert("cluster.dns.type".to_string(), "srv".to_string());
        self.0.insert("cluster.dns.app".to_string(), name.clone());
        self.0.insert(
            "cluster.dns.name".to_string(),
            format!("{}-headless.{}.svc.cluster.local", name, namespace),
        );

        for (key, value) in FILL_DEFAULTS {
            self.0
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
    }

    /// Port configured for a listener key, if set and parseable.
    ///
    /// Accepts both `1883` and `0.0.0.0:1883`.
    pub fn listener_port(&self, key: &str) -> Option<i32> {
        let value = self.0.get(key)?.trim();
        if value.is_empty() {
            return None;
        }
        let port = value.rsplit(':').next()?;
        match port.parse::<i32>() {
            Ok(port) if (1..=65535).contains(&port) => Some(port),
            _ => None,
        }
    }
}

impl Deref for EmqxConfig {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EmqxConfig {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<BTreeMap<String, String>> for EmqxConfig {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
