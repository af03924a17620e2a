//! # EMQX Admission Webhook
//!
//! Defaulting and validation webhooks for the `EmqxBroker` and
//! `EmqxEnterprise` custom resources (`apps.emqx.io/v1beta3`).
//!
//! Every write to one of these resources passes through two phases before
//! the API server persists it:
//!
//! 1. **Defaulting** ([`defaulter::Defaulter`]): reserved labels, broker
//!    configuration, service template, security context and credentials are
//!    filled in. Never rejects.
//! 2. **Validation** ([`validation::Validator`]): create and update requests
//!    are checked in a fixed order and rejected on the first failure.
//!    Deletes are always admitted.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use emqx_webhook::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     run(WebhookConfig::default()).await
//! }
//! ```
//!
//! ## Example resource
//!
//! ```yaml
//! apiVersion: apps.emqx.io/v1beta3
//! kind: EmqxEnterprise
//! metadata:
//!   name: emqx-ee
//! spec:
//!   replicas: 3
//!   emqxTemplate:
//!     image: emqx/emqx-ee:4.4.8
//!     license:
//!       secretName: emqx-license
//! ```
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`emqx`] - Capability interface over the resource variants
//! - [`defaulter`] - Mutation phase
//! - [`validation`] - Validation phase
//! - [`admission`] - AdmissionReview endpoints
//! - [`server`] - HTTP(S) hosting
//! - [`error`] - Error types

pub mod admission;
pub mod crd;
pub mod defaulter;
pub mod emqx;
pub mod emqx_config;
pub mod error;
pub mod image;
pub mod server;
pub mod service_template;
pub mod validation;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::admission::{router, AdmissionMetrics, AdmissionState, Phase};
    pub use crate::crd::{
        EmqxBroker, EmqxBrokerSpec, EmqxEnterprise, EmqxEnterpriseSpec, EmqxEnterpriseTemplate,
        EmqxTemplate, License,
    };
    pub use crate::defaulter::Defaulter;
    pub use crate::emqx::{Emqx, EmqxKind, EmqxObject};
    pub use crate::emqx_config::EmqxConfig;
    pub use crate::error::{Result, WebhookError};
    pub use crate::server::{run, TlsConfig, WebhookConfig};
    pub use crate::service_template::ServiceTemplate;
    pub use crate::validation::Validator;
}
