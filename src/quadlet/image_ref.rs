//! Image reference parsing: `[registry/][namespace/]name[:tag][@digest]`.
//!
//! Three phases, each peeled off the tail first so a literal `:` inside
//! a registry host-port (`localhost:5000/foo`) is never misread as a
//! tag separator:
//!
//! 1. split at the last `@` → digest
//! 2. split at the last `:` *after* the last `/` → tag
//! 3. split at the first `/` as a registry, but only if that prefix
//!    contains `.` or `:`, otherwise it's a namespace segment, not a
//!    registry host.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, e.g. `localhost:5000` or `docker.io`.
    pub registry: Option<String>,
    /// Everything between registry and tag/digest, e.g. `library/caddy`.
    pub name: String,
    /// Tag, e.g. `2`.
    pub tag: Option<String>,
    /// Digest, e.g. `sha256:...`.
    pub digest: Option<String>,
}

/// Parse an image reference string.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if `s` is empty.
pub fn parse(s: &str) -> Result<ImageRef> {
    if s.is_empty() {
        return Err(Error::invalid_config("image", "image reference is empty"));
    }

    let (rest, digest) = match s.rfind('@') {
        Some(idx) => (&s[..idx], Some(s[idx + 1..].to_string())),
        None => (s, None),
    };

    let last_slash = rest.rfind('/');
    let (rest, tag) = match rest.rfind(':') {
        Some(idx) if last_slash.is_none_or(|slash| idx > slash) => {
            (&rest[..idx], Some(rest[idx + 1..].to_string()))
        }
        _ => (rest, None),
    };

    let (registry, name) = match rest.find('/') {
        Some(idx) => {
            let prefix = &rest[..idx];
            if prefix.contains('.') || prefix.contains(':') {
                (Some(prefix.to_string()), rest[idx + 1..].to_string())
            } else {
                (None, rest.to_string())
            }
        }
        None => (None, rest.to_string()),
    };

    if name.is_empty() {
        return Err(Error::invalid_config("image", "image name is empty"));
    }

    Ok(ImageRef {
        registry,
        name,
        tag,
        digest,
    })
}

/// Rebuild the reference string for an [`ImageRef`]. Inverse of
/// [`parse`]: `build(parse(s)) == s` for syntactically valid `s`.
#[must_use]
pub fn build(image: &ImageRef) -> String {
    let mut out = String::new();
    if let Some(registry) = &image.registry {
        out.push_str(registry);
        out.push('/');
    }
    out.push_str(&image.name);
    if let Some(tag) = &image.tag {
        out.push(':');
        out.push_str(tag);
    }
    if let Some(digest) = &image.digest {
        out.push('@');
        out.push_str(digest);
    }
    out
}

/// The compiled `Image=` value: `name[@digest]`, with the tag folded
/// into `name`'s reconstructed form. `image_digest`, when present,
/// overrides any digest parsed out of `image` itself: the compiled
/// value is always `image@digest` once an explicit digest is given.
#[must_use]
pub fn compiled_image_value(image: &str, image_digest: Option<&str>) -> String {
    match image_digest {
        Some(digest) => format!("{image}@{digest}"),
        None => image.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_reference_round_trip() {
        let s = "localhost:5000/foo:bar@sha256:abc123";
        let parsed = parse(s).unwrap();
        assert_eq!(parsed.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(parsed.name, "foo");
        assert_eq!(parsed.tag.as_deref(), Some("bar"));
        assert_eq!(parsed.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(build(&parsed), s);
    }

    #[test]
    fn namespace_without_dot_or_colon_is_not_a_registry() {
        let parsed = parse("library/caddy:2").unwrap();
        assert_eq!(parsed.registry, None);
        assert_eq!(parsed.name, "library/caddy");
        assert_eq!(parsed.tag.as_deref(), Some("2"));
    }

    #[test]
    fn bare_name_round_trips() {
        let s = "redis";
        let parsed = parse(s).unwrap();
        assert_eq!(build(&parsed), s);
    }

    #[test]
    fn registry_with_port_is_not_mistaken_for_a_tag() {
        let parsed = parse("localhost:5000/foo").unwrap();
        assert_eq!(parsed.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(parsed.tag, None);
    }

    #[test]
    fn empty_reference_is_rejected() {
        assert!(parse("").is_err());
    }

    #[test]
    fn compiled_value_prefers_explicit_digest() {
        assert_eq!(
            compiled_image_value("docker.io/library/caddy:2", Some("sha256:deadbeef")),
            "docker.io/library/caddy:2@sha256:deadbeef"
        );
        assert_eq!(
            compiled_image_value("docker.io/library/caddy:2", None),
            "docker.io/library/caddy:2"
        );
    }
}
