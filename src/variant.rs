//! Conversion between typed values and the text kept in a settings store.
//!
//! Every type a [`PersistentCell`](crate::PersistentCell) can hold implements
//! [`VariantConverter`]. Primitives are stored as plain text, structured
//! aggregates opt in through [`JsonVariant`] and are stored as a JSON object.

use crate::error::ConversionError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Per-type strategy for turning a value into stored text and back.
///
/// Implementations must round-trip: `T::from_variant(&v.to_variant())` yields
/// a value equal to `v` for every valid `v`.
pub trait VariantConverter: Sized {
    /// Canonical text for this value.
    fn to_variant(&self) -> String;

    /// Decode a value from stored text.
    fn from_variant(text: &str) -> Result<Self, ConversionError>;
}

/// Marker for structured types stored as field-tagged JSON.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Layout { width: f32, visible: bool, columns: i32 }
///
/// impl JsonVariant for Layout {}
/// ```
pub trait JsonVariant: Serialize + DeserializeOwned {}

impl<T: JsonVariant> VariantConverter for T {
    fn to_variant(&self) -> String {
        match serde_json::to_string(self) {
            Ok(text) => text,
            Err(err) => {
                // Only reachable for values serde_json cannot express, e.g. maps
                // with non-string keys. "null" fails to decode, so the cell keeps
                // its last-known-good value on the read side.
                tracing::error!(
                    type_name = std::any::type_name::<T>(),
                    %err,
                    "value cannot be encoded as JSON"
                );
                "null".to_owned()
            }
        }
    }

    fn from_variant(text: &str) -> Result<Self, ConversionError> {
        serde_json::from_str(text).map_err(|err| ConversionError::new::<T>(text, err))
    }
}

/// Decode `text` as `T` and encode it again, producing the canonical form.
pub fn canonicalize<T: VariantConverter>(text: &str) -> Result<(String, T), ConversionError> {
    let value = T::from_variant(text)?;
    Ok((value.to_variant(), value))
}

impl VariantConverter for bool {
    fn to_variant(&self) -> String {
        let text = if *self { "1" } else { "0" };
        text.to_owned()
    }

    fn from_variant(text: &str) -> Result<Self, ConversionError> {
        match text.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(ConversionError::new::<bool>(text, "expected 1, 0, true or false")),
        }
    }
}

impl VariantConverter for String {
    fn to_variant(&self) -> String {
        self.clone()
    }

    fn from_variant(text: &str) -> Result<Self, ConversionError> {
        Ok(text.to_owned())
    }
}

macro_rules! impl_variant_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl VariantConverter for $ty {
                fn to_variant(&self) -> String {
                    self.to_string()
                }

                fn from_variant(text: &str) -> Result<Self, ConversionError> {
                    text.trim()
                        .parse::<$ty>()
                        .map_err(|err| ConversionError::new::<$ty>(text, err))
                }
            }
        )*
    };
}

// `Display` on floats prints the shortest text that parses back to the same
// value, so these impls round-trip without a fixed precision.
impl_variant_from_str!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Complex {
        f: f32,
        b: bool,
        i: i32,
    }

    impl JsonVariant for Complex {}

    #[test]
    fn test_float_text() {
        assert_eq!(3.5f32.to_variant(), "3.5");
        assert_eq!(2.0f64.to_variant(), "2");
        assert_eq!(f32::from_variant(" 2.5 "), Ok(2.5));
    }

    #[test]
    fn test_bool_text() {
        assert_eq!(true.to_variant(), "1");
        assert_eq!(bool::from_variant("false"), Ok(false));
        assert!(bool::from_variant("maybe").is_err());
    }

    #[test]
    fn test_conversion_error_names_type() {
        let err = i32::from_variant("forty-two").unwrap_err();
        assert_eq!(err.type_name, "i32");
        assert_eq!(err.text, "forty-two");
    }

    #[test]
    fn test_json_aggregate_is_field_tagged() {
        let value = Complex { f: 3.0, b: false, i: 10 };
        let text = value.to_variant();
        assert_eq!(text, r#"{"f":3.0,"b":false,"i":10}"#);
        assert_eq!(Complex::from_variant(&text), Ok(value));
    }

    #[test]
    fn test_json_aggregate_rejects_missing_field() {
        assert!(Complex::from_variant(r#"{"f":1.0}"#).is_err());
    }

    #[test]
    fn test_canonicalize_normalizes_text() {
        let (text, value) = canonicalize::<f64>("3.50").unwrap();
        assert_eq!(text, "3.5");
        assert_eq!(value, 3.5);
    }

    proptest! {
        #[test]
        fn prop_f32_round_trips(v in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            prop_assert_eq!(f32::from_variant(&v.to_variant()).unwrap(), v);
        }

        #[test]
        fn prop_i64_round_trips(v in any::<i64>()) {
            prop_assert_eq!(i64::from_variant(&v.to_variant()).unwrap(), v);
        }

        #[test]
        fn prop_string_round_trips(v in ".*") {
            prop_assert_eq!(String::from_variant(&v.to_variant()).unwrap(), v);
        }

        #[test]
        fn prop_complex_round_trips(
            f in (-100_000i32..100_000).prop_map(|n| n as f32 / 4.0),
            b in any::<bool>(),
            i in any::<i32>(),
        ) {
            let value = Complex { f, b, i };
            prop_assert_eq!(Complex::from_variant(&value.to_variant()).unwrap(), value);
        }
    }
}
