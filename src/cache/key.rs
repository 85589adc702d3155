//! Cache Key Module
//!
//! Cache keys and feature tags. [`CacheKey::of`] and [`FeatureTag::of`] are
//! the only ways to build either, so every key in the system has the same
//! `"{feature}:{body}"` shape.

use std::fmt;

// == Cache Key ==
/// Address of a single cache entry: a feature namespace plus a key body.
///
/// Equality and hashing use the canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    canonical: String,
    feature_len: usize,
}

impl CacheKey {
    /// Builds the key `"{feature}:{body}"`.
    pub fn of(feature: impl AsRef<str>, body: impl fmt::Display) -> Self {
        let feature = feature.as_ref();
        Self {
            canonical: format!("{}:{}", feature, body),
            feature_len: feature.len(),
        }
    }

    /// The feature namespace the key belongs to.
    pub fn feature(&self) -> &str {
        &self.canonical[..self.feature_len]
    }

    /// The part after the feature separator.
    pub fn body(&self) -> &str {
        &self.canonical[self.feature_len + 1..]
    }

    /// The tag grouping every key of this feature.
    pub fn feature_tag(&self) -> FeatureTag {
        FeatureTag::of(self.feature())
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

// == Feature Tag ==
/// Names a whole feature group for bulk invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureTag(String);

impl FeatureTag {
    pub fn of(feature: impl AsRef<str>) -> Self {
        Self(feature.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FeatureTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
