//! Validation phase: gate create, update and delete requests
//!
//! Each entry point runs its checks in a fixed order and stops at the first
//! failure. The update order (image tag, credentials, license, persistence)
//! decides which reason is reported when several rules are broken at once.

use crate::crd::{EmqxBroker, EmqxEnterprise};
use crate::emqx::{Emqx, EmqxObject};
use crate::error::{Result, WebhookError};
use crate::image::validate_image_tag;
use kube::ResourceExt;
use serde::Serialize;
use tracing::{error, info};
use validator::Validate;

/// Admission checks for a resource kind
pub trait Validator {
    fn validate_create(&self) -> Result<()>;

    fn validate_update(&self, old: &Self) -> Result<()>;

    /// Deletion is always admitted
    fn validate_delete(&self) -> Result<()> {
        Ok(())
    }
}

impl Validator for EmqxBroker {
    fn validate_create(&self) -> Result<()> {
        info!(name = %self.name_any(), "validate create");
        validate_image_tag(self).inspect_err(log_failure("validate create failed"))
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        info!(name = %self.name_any(), "validate update");
        validate_image_tag(self)
            .and_then(|_| validate_username_and_password(self, old))
            .and_then(|_| validate_persistent(self, old))
            .inspect_err(log_failure("validate update failed"))
    }

    fn validate_delete(&self) -> Result<()> {
        info!(name = %self.name_any(), "validate delete");
        Ok(())
    }
}

impl Validator for EmqxEnterprise {
    fn validate_create(&self) -> Result<()> {
        info!(name = %self.name_any(), "validate create");
        validate_image_tag(self)
            .and_then(|_| validate_license(self))
            .inspect_err(log_failure("validate create failed"))
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        info!(name = %self.name_any(), "validate update");
        validate_image_tag(self)
            .and_then(|_| validate_username_and_password(self, old))
            .and_then(|_| validate_license(self))
            .and_then(|_| validate_persistent(self, old))
            .inspect_err(log_failure("validate update failed"))
    }

    fn validate_delete(&self) -> Result<()> {
        info!(name = %self.name_any(), "validate delete");
        Ok(())
    }
}

impl Validator for EmqxObject {
    fn validate_create(&self) -> Result<()> {
        match self {
            EmqxObject::Broker(emqx) => emqx.validate_create(),
            EmqxObject::Enterprise(emqx) => emqx.validate_create(),
        }
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        match (self, old) {
            (EmqxObject::Broker(new), EmqxObject::Broker(old)) => new.validate_update(old),
            (EmqxObject::Enterprise(new), EmqxObject::Enterprise(old)) => {
                new.validate_update(old)
            }
            _ => Err(WebhookError::InvalidRequest(format!(
                "cannot update {} from {}",
                self.kind(),
                old.kind()
            ))),
        }
    }

    fn validate_delete(&self) -> Result<()> {
        match self {
            EmqxObject::Broker(emqx) => emqx.validate_delete(),
            EmqxObject::Enterprise(emqx) => emqx.validate_delete(),
        }
    }
}

fn log_failure(msg: &'static str) -> impl Fn(&WebhookError) {
    move |err| error!(error = %err, "{}", msg)
}

/// Username and password cannot change after creation. Username is checked first.
pub fn validate_username_and_password<E: Emqx>(new: &E, old: &E) -> Result<()> {
    if new.username() != old.username() {
        return Err(WebhookError::ImmutableFieldViolation(
            "refuse to update username".to_string(),
        ));
    }
    if new.password() != old.password() {
        return Err(WebhookError::ImmutableFieldViolation(
            "refuse to update password".to_string(),
        ));
    }
    Ok(())
}

/// A license comes from either a Secret or inline material, not both
pub fn validate_license<E: Emqx>(emqx: &E) -> Result<()> {
    let Some(license) = emqx.license() else {
        return Ok(());
    };
    license.validate().map_err(|errors| {
        let reasons: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| {
                errs.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
            })
            .collect();
        WebhookError::InvalidSpec(reasons.join("; "))
    })
}

/// Persistent storage cannot change after creation
pub fn validate_persistent<E: Emqx>(new: &E, old: &E) -> Result<()> {
    if !deep_equal(&new.persistent(), &old.persistent()) {
        return Err(WebhookError::ImmutableFieldViolation(
            "refuse to update persistent".to_string(),
        ));
    }
    Ok(())
}

/// Structural equality over the full serialized value tree.
///
/// Two values are equal when every nested field compares equal; values that
/// fail to serialize are never equal.
pub fn deep_equal<T: Serialize + ?Sized>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
