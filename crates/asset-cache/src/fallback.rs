//! Placeholders shown when no real asset is available

use serde::Serialize;

use crate::config::AssetKind;

const GENERATED_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg";

/// Seed used when the caller has nothing better
pub const DEFAULT_SEED: &str = "default";

/// What to render in place of a missing asset.
///
/// A pure function of kind and seed; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackDescriptor {
    /// A generated avatar image
    GeneratedAvatar { url: String },
    /// Render nothing
    Empty,
}

impl FallbackDescriptor {
    pub fn for_kind(kind: AssetKind, seed: &str) -> Self {
        match kind {
            AssetKind::Avatar => FallbackDescriptor::GeneratedAvatar {
                url: generated_avatar_url(seed),
            },
            AssetKind::PostImage => FallbackDescriptor::Empty,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            FallbackDescriptor::GeneratedAvatar { url } => Some(url),
            FallbackDescriptor::Empty => None,
        }
    }
}

/// URL of a generated avatar for `seed`
pub fn generated_avatar_url(seed: &str) -> String {
    let seed = if seed.is_empty() { DEFAULT_SEED } else { seed };
    format!(
        "{}?seed={}",
        GENERATED_AVATAR_BASE,
        urlencoding::encode(seed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_avatar_is_deterministic() {
        let a = FallbackDescriptor::for_kind(AssetKind::Avatar, "o-user-123");
        let b = FallbackDescriptor::for_kind(AssetKind::Avatar, "o-user-123");
        assert_eq!(a, b);
        assert_eq!(
            a.url(),
            Some("https://api.dicebear.com/7.x/avataaars/svg?seed=o-user-123")
        );
    }

    #[test]
    fn test_seed_is_url_encoded() {
        let url = generated_avatar_url("a b/c?d");
        assert!(url.ends_with("seed=a%20b%2Fc%3Fd"));
    }

    #[test]
    fn test_empty_seed_uses_default() {
        assert_eq!(generated_avatar_url(""), generated_avatar_url(DEFAULT_SEED));
    }

    #[test]
    fn test_post_image_fallback_is_empty() {
        let fallback = FallbackDescriptor::for_kind(AssetKind::PostImage, "anything");
        assert_eq!(fallback, FallbackDescriptor::Empty);
        assert!(fallback.url().is_none());
    }

    #[test]
    fn test_fallback_serialization() {
        let json = serde_json::to_value(FallbackDescriptor::Empty).unwrap();
        assert_eq!(json["type"], "empty");

        let json = serde_json::to_value(FallbackDescriptor::for_kind(AssetKind::Avatar, "x")).unwrap();
        assert_eq!(json["type"], "generated_avatar");
        assert!(json["url"].as_str().unwrap().contains("seed=x"));
    }
}
