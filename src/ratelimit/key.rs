//! Client key handling.

use std::borrow::Borrow;

/// A key that uniquely identifies a client for quota purposes.
///
/// The tracker treats the key as opaque. In practice it is a network address
/// without its port, produced by the identity extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a new client key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_client_key_display() {
        let key = ClientKey::new("3.4.5.6");
        assert_eq!(key.to_string(), "3.4.5.6");
        assert_eq!(key.as_str(), "3.4.5.6");
    }

    #[test]
    fn test_client_key_equality() {
        let key1 = ClientKey::from("1.2.3.4");
        let key2 = ClientKey::from("1.2.3.4".to_string());
        let key3 = ClientKey::from("1.2.3.5");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_client_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ClientKey::new("::1"), 1);

        assert_eq!(map.get("::1"), Some(&1));
    }
}
