//! Query → cache key derivation.

/// How a backend turns a query into a storage key.
///
/// Each backend ships with its own default; the redis default lowercases
/// queries so lookups there are case-insensitive while the other backends are
/// not. Use a store's `with_key_scheme` to line them up.
///
/// # Examples
///
/// ```
/// use geocache::store::KeyScheme;
///
/// let scheme = KeyScheme::prefixed("geocode:").lowercase(true);
/// assert_eq!(scheme.build("Galway, Ireland"), "geocode:galway, ireland");
/// assert_eq!(KeyScheme::identity().build("Galway"), "Galway");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: &'static str,
    lowercase: bool,
}

impl KeyScheme {
    /// Namespace tag used by the shared backends.
    pub const NAMESPACE: &'static str = "geocode:";

    /// The query itself is the key.
    pub const fn identity() -> Self {
        Self {
            prefix: "",
            lowercase: false,
        }
    }

    /// Keys are `prefix` followed by the query.
    pub const fn prefixed(prefix: &'static str) -> Self {
        Self {
            prefix,
            lowercase: false,
        }
    }

    /// Enables or disables lowercasing of the query before prefixing.
    #[must_use]
    pub const fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Builds the key for `query`.
    pub fn build(&self, query: &str) -> String {
        if self.lowercase {
            format!("{}{}", self.prefix, query.to_lowercase())
        } else {
            format!("{}{}", self.prefix, query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_query_unchanged() {
        assert_eq!(KeyScheme::identity().build("Brussels"), "Brussels");
    }

    #[test]
    fn prefix_preserves_case() {
        let scheme = KeyScheme::prefixed(KeyScheme::NAMESPACE);
        assert_eq!(scheme.build("Brussels"), "geocode:Brussels");
        assert_ne!(scheme.build("Brussels"), scheme.build("BRUSSELS"));
    }

    #[test]
    fn lowercase_folds_case() {
        let scheme = KeyScheme::prefixed(KeyScheme::NAMESPACE).lowercase(true);
        assert_eq!(scheme.build("Brussels"), scheme.build("BRUSSELS"));
        assert_eq!(scheme.build("ÉCOLE"), "geocode:école");
    }

    #[test]
    fn deterministic() {
        let scheme = KeyScheme::prefixed("x:").lowercase(true);
        assert_eq!(scheme.build("Q"), scheme.build("Q"));
    }
}
