//! Container image reference checks

use crate::emqx::Emqx;
use crate::error::{Result, WebhookError};
use regex::Regex;
use semver::Version;
use std::sync::LazyLock;
use validator::ValidationError;

/// Docker tag grammar
static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap());

/// Version-shaped tags: `4.4`, `v4.4.8`, `4.4.8-alpine`
static VERSION_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(?P<major>\d+)\.(?P<minor>\d+)(\.(?P<patch>\d+))?(-[A-Za-z0-9_.-]+)?$").unwrap()
});

/// Oldest EMQX release this API version supports
pub const MIN_EMQX_VERSION: Version = Version::new(4, 4, 0);

/// Validate a container image reference
fn validate_image(value: &str) -> std::result::Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("image_required").with_message("image is required".into()));
    }
    if value.len() > 255 {
        return Err(ValidationError::new("image_too_long")
            .with_message("image reference exceeds 255 characters".into()));
    }
    if value.contains("..")
        || value.starts_with('/')
        || value.starts_with('-')
        || value.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::new("invalid_image")
            .with_message(format!("'{}' is not a valid container image", value).into()));
    }
    Ok(())
}

/// Tag of an image reference, ignoring any digest.
///
/// `None` when the reference carries no tag.
pub fn image_tag(image: &str) -> Option<&str> {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_component = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last_component
        .split_once(':')
        .map(|(_, tag)| tag)
}

/// Parse a version-shaped tag, padding a missing patch component
fn parse_tag_version(tag: &str) -> Option<Version> {
    let caps = VERSION_TAG_REGEX.captures(tag)?;
    let major = caps.name("major")?.as_str().parse().ok()?;
    let minor = caps.name("minor")?.as_str().parse().ok()?;
    let patch = match caps.name("patch") {
        Some(patch) => patch.as_str().parse().ok()?,
        None => 0,
    };
    Some(Version::new(major, minor, patch))
}

/// Check that the image reference is well formed and its tag names a
/// supported EMQX release (or is absent/`latest`).
pub fn validate_image_tag<E: Emqx>(emqx: &E) -> Result<()> {
    let image = emqx.image();
    validate_image(image).map_err(|e| {
        WebhookError::InvalidSpec(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string()),
        )
    })?;

    let tag = match image_tag(image) {
        None | Some("latest") => return Ok(()),
        Some(tag) => tag,
    };

    if !TAG_REGEX.is_match(tag) {
        return Err(WebhookError::InvalidSpec(format!(
            "'{}' is not a valid image tag",
            tag
        )));
    }

    let version = parse_tag_version(tag).ok_or_else(|| {
        WebhookError::InvalidSpec(format!(
            "image tag '{}' does not name an EMQX version",
            tag
        ))
    })?;

    if version < MIN_EMQX_VERSION {
        return Err(WebhookError::InvalidSpec(format!(
            "EMQX image version {} is not supported, need at least {}",
            version, MIN_EMQX_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EmqxBroker, EmqxBrokerSpec};

    fn broker_with_image(image: &str) -> EmqxBroker {
        let mut broker = EmqxBroker::new("emqx", EmqxBrokerSpec::default());
        broker.spec.emqx_template.image = image.to_string();
        broker
    }

    #[test]
    fn test_image_tag() {
        assert_eq!(image_tag("emqx/emqx:4.4.8"), Some("4.4.8"));
        assert_eq!(image_tag("emqx/emqx"), None);
        assert_eq!(image_tag("registry:5000/emqx/emqx"), None);
        assert_eq!(image_tag("registry:5000/emqx/emqx:4.4"), Some("4.4"));
        assert_eq!(
            image_tag("emqx/emqx:4.4.8@sha256:0123456789abcdef"),
            Some("4.4.8")
        );
    }

    #[test]
    fn test_parse_tag_version() {
        assert_eq!(parse_tag_version("4.4"), Some(Version::new(4, 4, 0)));
        assert_eq!(parse_tag_version("v4.4.8"), Some(Version::new(4, 4, 8)));
        assert_eq!(
            parse_tag_version("4.4.8-alpine"),
            Some(Version::new(4, 4, 8))
        );
        assert_eq!(parse_tag_version("nightly"), None);
    }

    #[test]
    fn test_accepted_images() {
        for image in [
            "emqx/emqx:4.4.8",
            "emqx/emqx-ee:4.4",
            "emqx/emqx:latest",
            "emqx/emqx",
            "registry:5000/emqx/emqx:v5.0.0",
        ] {
            assert!(
                validate_image_tag(&broker_with_image(image)).is_ok(),
                "{} should be accepted",
                image
            );
        }
    }

    #[test]
    fn test_rejected_images() {
        for image in [
            "",
            "emqx/emqx:4.3.12",
            "emqx/emqx:nightly",
            "/emqx/emqx:4.4.8",
            "emqx/emqx: 4.4.8",
        ] {
            let err = validate_image_tag(&broker_with_image(image)).unwrap_err();
            assert!(
                matches!(err, WebhookError::InvalidSpec(_)),
                "{} should be rejected",
                image
            );
        }
    }
}
