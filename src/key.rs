//! Cache key encoding.
//!
//! Keys are turned into the canonical string form backends operate on.
//! Encoding must be pure: the same key always yields the same string.

use crate::error::{Error, Result};
use uuid::Uuid;

/// A value usable as a cache key.
///
/// Implemented for strings, characters, booleans, every primitive integer and
/// [`Uuid`]. Implement it for your own types by returning a stable string:
///
/// ```
/// use stampede_cache::CacheKey;
///
/// struct UserId(u64);
///
/// impl CacheKey for UserId {
///     fn cache_key(&self) -> String {
///         format!("user:{}", self.0)
///     }
/// }
///
/// assert_eq!(UserId(7).cache_key(), "user:7");
/// ```
pub trait CacheKey {
    /// Canonical string form of the key.
    fn cache_key(&self) -> String;
}

impl CacheKey for str {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl<T: CacheKey + ?Sized> CacheKey for &T {
    fn cache_key(&self) -> String {
        (**self).cache_key()
    }
}

impl CacheKey for Uuid {
    fn cache_key(&self) -> String {
        self.as_hyphenated().to_string()
    }
}

macro_rules! display_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheKey for $ty {
                fn cache_key(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key!(char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Validates encoded keys before they reach a backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec;

impl KeyCodec {
    /// Create a codec.
    pub fn new() -> Self {
        KeyCodec
    }

    /// Encode `key`, rejecting empty or malformed results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key encodes to an empty string or
    /// to a string containing ASCII control characters.
    pub fn encode<K: CacheKey + ?Sized>(&self, key: &K) -> Result<String> {
        let encoded = key.cache_key();
        Self::validate(&encoded)?;
        Ok(encoded)
    }

    /// Check an already-encoded key.
    ///
    /// # Errors
    ///
    /// Same conditions as [`KeyCodec::encode`].
    pub fn validate(encoded: &str) -> Result<()> {
        if encoded.is_empty() {
            return Err(Error::InvalidKey("key encodes to an empty string".to_string()));
        }
        if encoded.chars().any(|c| c.is_ascii_control()) {
            return Err(Error::InvalidKey(format!(
                "key {:?} contains control characters",
                encoded
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_primitive_keys() {
        let codec = KeyCodec::new();
        assert_eq!(codec.encode("user").unwrap(), "user");
        assert_eq!(codec.encode(&42u32).unwrap(), "42");
        assert_eq!(codec.encode(&-7i64).unwrap(), "-7");
        assert_eq!(codec.encode(&'x').unwrap(), "x");
        assert_eq!(codec.encode(&true).unwrap(), "true");
        assert_eq!(codec.encode(&"owned".to_string()).unwrap(), "owned");
    }

    #[test]
    fn test_uuid_key_is_hyphenated() {
        let id = Uuid::now_v7();
        let encoded = KeyCodec::new().encode(&id).unwrap();
        assert_eq!(encoded.len(), 36);
        assert_eq!(encoded, id.to_string());
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = KeyCodec::new().encode("").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(KeyCodec::new().encode("a\nb").is_err());
        assert!(KeyCodec::new().encode("a\0").is_err());
        assert!(KeyCodec::new().encode("naïve key").is_ok());
    }

    proptest! {
        #[test]
        fn prop_encoding_is_deterministic(n in any::<i64>()) {
            let codec = KeyCodec::new();
            prop_assert_eq!(codec.encode(&n).unwrap(), codec.encode(&n).unwrap());
        }

        #[test]
        fn prop_printable_strings_accepted(s in "[a-zA-Z0-9:_-]{1,64}") {
            prop_assert_eq!(KeyCodec::new().encode(&s).unwrap(), s);
        }
    }
}
