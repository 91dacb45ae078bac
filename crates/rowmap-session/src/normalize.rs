//! Generated-key normalization.
//!
//! Drivers report generated keys in whatever integer width the server column
//! happens to use. These helpers convert a reported key into the
//! representation of the record's declared [`IdKind`].

use num_bigint::BigInt;
use rowmap_core::{IdKind, Value};

/// Convert `raw` into the representation `kind` expects.
///
/// Conversions between 32-bit, 64-bit and arbitrary-precision integers are
/// performed when they are lossless. Anything else is returned unchanged and
/// left to the id type's own conversion to reject.
pub fn normalize_generated_id(kind: IdKind, raw: Value) -> Value {
    match try_normalize_generated_id(kind, &raw) {
        Some(value) => value,
        None => {
            tracing::debug!(
                kind = ?kind,
                actual = raw.type_name(),
                "Generated key passed through without normalization"
            );
            raw
        }
    }
}

/// Like [`normalize_generated_id`], but returns `None` when the key cannot be
/// represented losslessly in `kind`.
pub fn try_normalize_generated_id(kind: IdKind, raw: &Value) -> Option<Value> {
    if kind.accepts_value(raw) {
        return Some(raw.clone());
    }
    match kind {
        IdKind::Int => wide(raw)
            .and_then(|n| i32::try_from(&n).ok())
            .map(Value::Int),
        IdKind::BigInt => wide(raw)
            .and_then(|n| i64::try_from(&n).ok())
            .map(Value::BigInt),
        IdKind::BigNum => wide(raw).map(Value::BigNum),
        IdKind::Text => None,
    }
}

fn wide(raw: &Value) -> Option<BigInt> {
    if raw.is_integer() {
        raw.as_bignum()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening() {
        assert_eq!(
            normalize_generated_id(IdKind::BigInt, Value::Int(7)),
            Value::BigInt(7)
        );
        assert_eq!(
            normalize_generated_id(IdKind::BigNum, Value::BigInt(7)),
            Value::BigNum(BigInt::from(7))
        );
        assert_eq!(
            normalize_generated_id(IdKind::Int, Value::SmallInt(7)),
            Value::Int(7)
        );
    }

    #[test]
    fn test_narrowing_when_lossless() {
        assert_eq!(
            normalize_generated_id(IdKind::Int, Value::BigInt(42)),
            Value::Int(42)
        );
        assert_eq!(
            normalize_generated_id(IdKind::BigInt, Value::BigNum(BigInt::from(42))),
            Value::BigInt(42)
        );
    }

    #[test]
    fn test_lossy_conversion_passes_through() {
        let big = Value::BigInt(i64::from(i32::MAX) + 1);
        assert_eq!(normalize_generated_id(IdKind::Int, big.clone()), big);
        assert!(try_normalize_generated_id(IdKind::Int, &big).is_none());

        let huge = Value::BigNum(BigInt::from(u64::MAX) * 4);
        assert_eq!(normalize_generated_id(IdKind::BigInt, huge.clone()), huge);
    }

    #[test]
    fn test_unsupported_passes_through() {
        let text = Value::Text("abc".into());
        assert_eq!(normalize_generated_id(IdKind::BigInt, text.clone()), text);
        assert_eq!(
            normalize_generated_id(IdKind::Text, Value::BigInt(1)),
            Value::BigInt(1)
        );
        assert_eq!(
            normalize_generated_id(IdKind::Text, Value::Text("k".into())),
            Value::Text("k".into())
        );
    }
}
