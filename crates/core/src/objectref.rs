//! Object reference normalization rules.
//!
//! A stored file is addressed three ways across the stack:
//!
//! 1. Canonical path `/objects/<relative-path>` - the only form persisted
//!    in business records and sent to the browser
//! 2. Provider-absolute URL - transient, generated per request, expiring
//! 3. Preset token `preset:<name>` - a bundled asset, never backed by the
//!    storage adapter
//!
//! This module is the single source of truth for translating between them.
//! Everything here is pure string manipulation: deterministic, no I/O, no
//! storage access. Rules apply in order, first match wins.

/// Prefix of every canonical object path.
pub const CANONICAL_PREFIX: &str = "/objects/";

/// Prefix of preset tokens.
pub const PRESET_PREFIX: &str = "preset:";

/// Default private-root marker found in provider-absolute URLs issued by
/// the storage adapter. Everything from the marker on is the canonical
/// relative path.
pub const PRIVATE_ROOT_MARKER: &str = "uploads/";

/// Built-in cover assets bundled with the client.
pub const PRESET_NAMES: &[&str] = &[
    "amber", "forest", "ocean", "orange", "rose", "slate", "violet",
];

/// A parsed object reference, exactly one shape at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRef {
    /// Canonical `/objects/...` path, persistable.
    Canonical(String),
    /// Built-in asset token, persistable; resolved client-side without
    /// touching storage.
    Preset(String),
    /// Anything else: an external or unrecognized reference, passed through
    /// unchanged and never persisted as an object reference.
    External(String),
}

impl ObjectRef {
    /// Parse a raw reference, applying the normalization rules with the
    /// given private-root marker.
    #[must_use]
    pub fn parse(reference: &str, private_marker: &str) -> Self {
        // Rule 1: already canonical.
        if reference.starts_with(CANONICAL_PREFIX) {
            return Self::Canonical(reference.to_string());
        }

        // Rule 2: preset token, or a path whose filename names a built-in
        // asset.
        if let Some(name) = reference.strip_prefix(PRESET_PREFIX) {
            return Self::Preset(name.to_string());
        }
        if let Some(name) = preset_name_from_filename(reference) {
            return Self::Preset(name.to_string());
        }

        // Rule 3: provider-absolute URL containing the private-root marker.
        if let Some(canonical) = strip_provider_url(reference, private_marker) {
            return Self::Canonical(canonical);
        }

        // Rule 4: do not guess.
        Self::External(reference.to_string())
    }

    /// The normalized string form of this reference.
    #[must_use]
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Canonical(path) | Self::External(path) => std::borrow::Cow::Borrowed(path),
            Self::Preset(name) => std::borrow::Cow::Owned(format!("{PRESET_PREFIX}{name}")),
        }
    }

    /// Whether this reference may be stored in business records. Only
    /// canonical paths and preset tokens are persistable; provider URLs
    /// expire and must never be written down.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        matches!(self, Self::Canonical(_) | Self::Preset(_))
    }
}

/// Normalize a raw reference to its canonical string form.
///
/// Canonical paths and unrecognized references come back unchanged; preset
/// filenames collapse to their token; provider-absolute URLs are stripped
/// to the canonical path beneath the private root.
#[must_use]
pub fn normalize(reference: &str, private_marker: &str) -> String {
    ObjectRef::parse(reference, private_marker).as_str().into_owned()
}

/// Normalize with the default private-root marker.
#[must_use]
pub fn normalize_default(reference: &str) -> String {
    normalize(reference, PRIVATE_ROOT_MARKER)
}

/// Bundled asset path for a known preset name.
#[must_use]
pub fn preset_asset_path(name: &str) -> Option<String> {
    PRESET_NAMES
        .contains(&name)
        .then(|| format!("/assets/covers/{name}.svg"))
}

/// Match filenames like `orange.png` or `cover-orange.svg` against the
/// built-in asset names.
fn preset_name_from_filename(reference: &str) -> Option<&'static str> {
    // Only consider path-ish references, not arbitrary words.
    if !reference.contains('/') {
        return None;
    }
    let without_query = reference.split('?').next().unwrap_or(reference);
    let filename = without_query.rsplit('/').next().unwrap_or(without_query);
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    let stem = stem.strip_prefix("cover-").unwrap_or(stem);

    PRESET_NAMES.iter().find(|name| **name == stem).copied()
}

/// Strip scheme, host, bucket and query from a provider-absolute URL,
/// keeping the path from the private-root marker on.
fn strip_provider_url(reference: &str, private_marker: &str) -> Option<String> {
    let after_scheme = reference.split_once("://")?.1;
    // Path component only: drop the host, then the query string.
    let path = after_scheme.split_once('/')?.1;
    let path = path.split('?').next().unwrap_or(path);

    let marker_idx = path.find(private_marker)?;
    Some(format!("{CANONICAL_PREFIX}{}", &path[marker_idx..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_passes_through() {
        assert_eq!(
            normalize_default("/objects/uploads/abc123"),
            "/objects/uploads/abc123"
        );
        assert_eq!(
            ObjectRef::parse("/objects/uploads/abc123", PRIVATE_ROOT_MARKER),
            ObjectRef::Canonical("/objects/uploads/abc123".to_string())
        );
    }

    #[test]
    fn test_preset_token() {
        let parsed = ObjectRef::parse("preset:orange", PRIVATE_ROOT_MARKER);
        assert_eq!(parsed, ObjectRef::Preset("orange".to_string()));
        assert_eq!(normalize_default("preset:orange"), "preset:orange");
    }

    #[test]
    fn test_preset_filename_resolution() {
        assert_eq!(normalize_default("/covers/orange.png"), "preset:orange");
        assert_eq!(
            normalize_default("https://cdn.example.com/assets/cover-slate.svg"),
            "preset:slate"
        );
    }

    #[test]
    fn test_signed_url_stripped_to_canonical() {
        // Fixture shared with the storage adapter's URL shape.
        assert_eq!(
            normalize(
                "https://storage.example.com/bucket/.private/uploads/abc123?sig=deadbeef&exp=900",
                "uploads/"
            ),
            "/objects/uploads/abc123"
        );
    }

    #[test]
    fn test_url_without_marker_passes_through() {
        let url = "https://example.com/somewhere/else.png";
        assert_eq!(normalize_default(url), url);
    }

    #[test]
    fn test_bare_reference_passes_through() {
        assert_eq!(normalize_default("not-an-object"), "not-an-object");
        assert_eq!(normalize_default(""), "");
    }

    #[test]
    fn test_marker_in_query_is_ignored() {
        let url = "https://example.com/file.bin?redirect=uploads/abc";
        assert_eq!(normalize_default(url), url);
    }

    #[test]
    fn test_persistable_forms() {
        assert!(ObjectRef::parse("/objects/uploads/a", PRIVATE_ROOT_MARKER).is_persistable());
        assert!(ObjectRef::parse("preset:rose", PRIVATE_ROOT_MARKER).is_persistable());
        assert!(!ObjectRef::parse("https://x.example/y", PRIVATE_ROOT_MARKER).is_persistable());
    }

    #[test]
    fn test_preset_asset_path() {
        assert_eq!(
            preset_asset_path("orange").as_deref(),
            Some("/assets/covers/orange.svg")
        );
        assert!(preset_asset_path("plaid").is_none());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    // Property: normalization is idempotent. Whatever shape a reference
    // arrives in, normalizing its normalized form changes nothing.
    proptest! {
        #[test]
        fn prop_normalize_idempotent(reference in ".{0,120}") {
            let once = normalize_default(&reference);
            let twice = normalize_default(&once);
            prop_assert_eq!(once, twice);
        }
    }

    // Property: canonical paths produced from signed URLs always carry the
    // canonical prefix and never retain host, bucket or query fragments.
    proptest! {
        #[test]
        fn prop_stripped_urls_are_canonical(
            host in "[a-z]{3,12}\\.example\\.com",
            bucket in "[a-z0-9-]{3,20}",
            id in "[a-f0-9]{8,32}",
            query in "[a-zA-Z0-9=&]{0,40}",
        ) {
            let url = format!("https://{host}/{bucket}/.private/uploads/{id}?{query}");
            let normalized = normalize(&url, "uploads/");

            prop_assert_eq!(&normalized, &format!("/objects/uploads/{id}"));
            prop_assert!(!normalized.contains(&host));
            prop_assert!(!normalized.contains('?'));
        }
    }

    // Property: upload-shaped canonical paths survive a round trip through
    // the parsed form.
    proptest! {
        #[test]
        fn prop_canonical_round_trip(rest in "[a-z0-9/-]{1,40}") {
            let path = format!("/objects/{rest}");
            let parsed = ObjectRef::parse(&path, PRIVATE_ROOT_MARKER);
            prop_assert_eq!(parsed.as_str().into_owned(), path);
        }
    }
}
