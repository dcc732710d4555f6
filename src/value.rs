//! Value coercion between typed values and the string form backends store.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can be committed to the cache.
///
/// Numbers are stored in their decimal text form so that remote stores can
/// apply their native increment commands to them.
pub trait CacheValue: Sized {
    /// Encode the value for storage.
    fn encode_value(&self) -> Result<String>;

    /// Decode a stored value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeConversion`] when `raw` is not a valid encoding
    /// of `Self`. There is no silent default.
    fn decode_value(raw: &str) -> Result<Self>;
}

impl CacheValue for String {
    fn encode_value(&self) -> Result<String> {
        Ok(self.clone())
    }

    fn decode_value(raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

macro_rules! parsed_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                fn encode_value(&self) -> Result<String> {
                    Ok(self.to_string())
                }

                fn decode_value(raw: &str) -> Result<Self> {
                    raw.trim().parse::<$ty>().map_err(|e| {
                        Error::TypeConversion(format!(
                            "cannot read {:?} as {}: {}",
                            raw,
                            stringify!($ty),
                            e
                        ))
                    })
                }
            }
        )*
    };
}

parsed_value!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Stores any serde type as JSON.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use stampede_cache::value::{CacheValue, Json};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Profile {
///     name: String,
/// }
///
/// let raw = Json(Profile { name: "ada".into() }).encode_value().unwrap();
/// let back = Json::<Profile>::decode_value(&raw).unwrap();
/// assert_eq!(back.0.name, "ada");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> CacheValue for Json<T> {
    fn encode_value(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    fn decode_value(raw: &str) -> Result<Self> {
        Ok(Json(serde_json::from_str(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_numbers_stored_as_text() {
        assert_eq!(42i64.encode_value().unwrap(), "42");
        assert_eq!(1.5f64.encode_value().unwrap(), "1.5");
        assert_eq!(i64::decode_value("-3").unwrap(), -3);
    }

    #[test]
    fn test_integer_reads_float_text_as_error() {
        let err = i64::decode_value("1.5").unwrap_err();
        assert!(matches!(err, Error::TypeConversion(_)));
    }

    #[test]
    fn test_float_accepts_integer_text() {
        assert_eq!(f64::decode_value("10").unwrap(), 10.0);
    }

    #[test]
    fn test_non_numeric_is_error() {
        assert!(matches!(
            u32::decode_value("abc"),
            Err(Error::TypeConversion(_))
        ));
        assert!(bool::decode_value("yes").is_err());
    }

    #[test]
    fn test_json_wrapper() {
        let raw = Json(Point { x: 1, y: 2 }).encode_value().unwrap();
        assert_eq!(raw, r#"{"x":1,"y":2}"#);
        assert_eq!(
            Json::<Point>::decode_value(&raw).unwrap().into_inner(),
            Point { x: 1, y: 2 }
        );
        assert!(matches!(
            Json::<Point>::decode_value("[1,2"),
            Err(Error::TypeConversion(_))
        ));
    }
}
