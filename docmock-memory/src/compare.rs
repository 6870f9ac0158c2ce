//! Equality and ordering of BSON values.
//!
//! Three relations are used by the matching engine:
//!
//! - **loose equality** ([`loose_eq`]) for literal constraints, `$ne` and `$in`: numbers
//!   compare by value across widths, numeric strings compare equal to the number they
//!   spell, an `ObjectId` equals its hex string, and documents compare key by key
//!   regardless of key order.
//! - **strict equality** ([`strict_eq`]) for `$eq` and `$all`: same kind and same value.
//!   `Int32` and `Int64` are one integer kind.
//! - **ordering** ([`compare`]) for `$gt`/`$gte`/`$lt`/`$lte`, and the total order used
//!   for sorting ([`sort_cmp`]).

use std::{borrow::Cow, cmp::Ordering};
use bson::{Bson, DateTime, Document};

/// Normalized, comparable view of a scalar BSON value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    DateTime(DateTime),
    String(Cow<'a, str>),
    Bytes(&'a [u8]),
    Other,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(*value as i64),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(Cow::Borrowed(value.as_str())),
            Bson::Binary(binary) => Comparable::Bytes(binary.bytes.as_slice()),
            Bson::Timestamp(ts) => Comparable::Integer(((ts.time as i64) << 32) | ts.increment as i64),
            _ => Comparable::Other,
        }
    }
}

impl Comparable<'_> {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Comparable::Integer(v) => Some(*v as f64),
            Comparable::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn numeric_string(&self) -> Option<f64> {
        match self {
            Comparable::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Rank of the kind, used to order values that do not compare directly.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Integer(_) | Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Bytes(_) => 3,
            Comparable::Bool(_) => 4,
            Comparable::DateTime(_) => 5,
            Comparable::Other => 6,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a.partial_cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                (Some(a), None) => b.numeric_string().and_then(|b| a.partial_cmp(&b)),
                (None, Some(b)) => a.numeric_string().and_then(|a| a.partial_cmp(&b)),
                (None, None) => None,
            },
        }
    }
}

/// Ordering of two values, or `None` when they are not comparable (e.g. a string that is
/// not numeric against a number).
pub fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    Comparable::from(left).partial_cmp(&Comparable::from(right))
}

/// Loose equality, see the module documentation.
pub fn loose_eq(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::Document(a), Bson::Document(b)) => documents_loose_eq(a, b),
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| loose_eq(a, b))
        }
        (Bson::ObjectId(oid), Bson::String(s)) | (Bson::String(s), Bson::ObjectId(oid)) => {
            oid.to_hex() == *s
        }
        (Bson::Document(_) | Bson::Array(_), _) | (_, Bson::Document(_) | Bson::Array(_)) => false,
        _ => match (Comparable::from(left), Comparable::from(right)) {
            (Comparable::Other, _) | (_, Comparable::Other) => left == right,
            (a, b) => a == b,
        },
    }
}

fn documents_loose_eq(left: &Document, right: &Document) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(key, value)| right.get(key).is_some_and(|other| loose_eq(value, other)))
}

/// Strict equality, see the module documentation.
pub fn strict_eq(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            Comparable::from(left) == Comparable::from(right)
        }
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && strict_eq(va, vb))
        }
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| strict_eq(a, b))
        }
        _ => left == right,
    }
}

/// Total order used when sorting results.
///
/// Missing values sort as `null` and object ids sort by their hex form. Values without a
/// scalar ordering (documents, arrays, ...) are compared by their string form. Values of kinds that still do not
/// compare fall back to a fixed kind order.
pub fn sort_cmp(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = sort_key(left);
    let right = sort_key(right);
    let (left, right) = (Comparable::from(&left), Comparable::from(&right));

    left.partial_cmp(&right)
        .unwrap_or_else(|| left.rank().cmp(&right.rank()))
}

fn sort_key(value: Option<&Bson>) -> Bson {
    match value {
        None => Bson::Null,
        Some(Bson::ObjectId(oid)) => Bson::String(oid.to_hex()),
        Some(value) => match Comparable::from(value) {
            Comparable::Other => Bson::String(value.to_string()),
            _ => value.clone(),
        },
    }
}

/// Whether a value is "truthy" as an operator operand (`$exists: 1`, `$not: true`).
pub fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::String(s) => !s.is_empty() && s != "0",
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use rstest::rstest;

    #[rstest]
    #[case(Bson::Int32(3), Bson::Int64(3), true)]
    #[case(Bson::Int32(3), Bson::Double(3.0), true)]
    #[case(Bson::String("3".into()), Bson::Int32(3), true)]
    #[case(Bson::String("abc".into()), Bson::Int32(0), false)]
    #[case(Bson::String("foo".into()), Bson::String("foo".into()), true)]
    #[case(Bson::Null, Bson::Null, true)]
    #[case(Bson::Boolean(true), Bson::Int32(1), false)]
    fn test_loose_eq(#[case] left: Bson, #[case] right: Bson, #[case] expected: bool) {
        assert_eq!(loose_eq(&left, &right), expected);
        assert_eq!(loose_eq(&right, &left), expected);
    }

    #[test]
    fn test_loose_eq_documents_ignore_key_order() {
        let left = Bson::Document(doc! { "a": 1, "b": "x" });
        let right = Bson::Document(doc! { "b": "x", "a": 1.0 });

        assert!(loose_eq(&left, &right));
        assert!(!strict_eq(&left, &right));
    }

    #[test]
    fn test_object_id_equals_hex() {
        let oid = ObjectId::new();

        assert!(loose_eq(&Bson::ObjectId(oid), &Bson::String(oid.to_hex())));
    }

    #[rstest]
    #[case(Bson::Int32(3), Bson::Int64(3), true)]
    #[case(Bson::Int32(3), Bson::Double(3.0), false)]
    #[case(Bson::String("3".into()), Bson::Int32(3), false)]
    fn test_strict_eq(#[case] left: Bson, #[case] right: Bson, #[case] expected: bool) {
        assert_eq!(strict_eq(&left, &right), expected);
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&Bson::Int32(1), &Bson::Double(1.5)), Some(Ordering::Less));
        assert_eq!(compare(&Bson::String("b".into()), &Bson::String("a".into())), Some(Ordering::Greater));
        assert_eq!(compare(&Bson::String("b".into()), &Bson::Int32(1)), None);
        assert_eq!(compare(&Bson::Null, &Bson::Int32(1)), None);
    }

    #[test]
    fn test_sort_cmp_missing_first() {
        assert_eq!(sort_cmp(None, Some(&Bson::Int32(1))), Ordering::Less);
        assert_eq!(sort_cmp(Some(&Bson::Int32(2)), Some(&Bson::Int32(1))), Ordering::Greater);
        assert_eq!(
            sort_cmp(Some(&Bson::String("a".into())), Some(&Bson::Int32(1))),
            Ordering::Greater
        );
    }
}
