//! Expression nodes of the wire format
//!
//! An expression position holds either a bare JSON literal (string, number,
//! boolean, null) or a tagged tuple. The tag determines the shape of the
//! remaining fields; anything else is a decoding error.

use crate::error::{WireError, WireResult};
use crate::tags;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

pub type Params = Vec<Expression>;

/// Named arguments: two parallel arrays of keys and value expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Hash {
    pub keys: Vec<String>,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    StringLiteral(String),
    NumberLiteral(f64),
    BoolLiteral(bool),
    Null,
    /// A free variable that may resolve to a helper or a property lookup.
    Unknown(String),
    /// A bound symbol slot plus a property path off of it.
    Get { symbol: u32, path: Vec<String> },
    /// A path that could be a local or an upvar; resolved at runtime.
    MaybeLocal(Vec<String>),
    HasBlock(u32),
    HasBlockParams(u32),
    Undefined,
    Helper {
        name: String,
        params: Params,
        hash: Option<Hash>,
    },
    Concat(Params),
}

impl Expression {
    /// The numeric wire tag of a tagged expression; literals have none.
    pub fn tag(&self) -> Option<u64> {
        match self {
            Expression::StringLiteral(_)
            | Expression::NumberLiteral(_)
            | Expression::BoolLiteral(_)
            | Expression::Null => None,
            Expression::Unknown(_) => Some(tags::UNKNOWN),
            Expression::Get { .. } => Some(tags::GET),
            Expression::MaybeLocal(_) => Some(tags::MAYBE_LOCAL),
            Expression::HasBlock(_) => Some(tags::HAS_BLOCK),
            Expression::HasBlockParams(_) => Some(tags::HAS_BLOCK_PARAMS),
            Expression::Undefined => Some(tags::UNDEFINED),
            Expression::Helper { .. } => Some(tags::HELPER),
            Expression::Concat(_) => Some(tags::CONCAT),
        }
    }

    pub fn from_value(value: &Value) -> WireResult<Expression> {
        let items = match value {
            Value::String(s) => return Ok(Expression::StringLiteral(s.clone())),
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| WireError::shape("finite number", "expression literal"))?;
                return Ok(Expression::NumberLiteral(n));
            }
            Value::Bool(b) => return Ok(Expression::BoolLiteral(*b)),
            Value::Null => return Ok(Expression::Null),
            Value::Array(items) => items,
            Value::Object(_) => {
                return Err(WireError::shape("literal or tagged tuple", "expression"));
            }
        };

        let tag = expect_tag(items, "expression")?;
        let fields = &items[1..];

        let arity = |expected: usize| -> WireResult<()> {
            if fields.len() == expected {
                Ok(())
            } else {
                Err(WireError::ExpressionArity {
                    tag,
                    expected,
                    actual: fields.len(),
                })
            }
        };

        match tag {
            tags::UNKNOWN => {
                arity(1)?;
                Ok(Expression::Unknown(expect_str(&fields[0], "Unknown name")?))
            }
            tags::GET => {
                arity(2)?;
                Ok(Expression::Get {
                    symbol: expect_u32(&fields[0], "Get symbol")?,
                    path: expect_str_array(&fields[1], "Get path")?,
                })
            }
            tags::MAYBE_LOCAL => {
                arity(1)?;
                Ok(Expression::MaybeLocal(expect_str_array(
                    &fields[0],
                    "MaybeLocal path",
                )?))
            }
            tags::HAS_BLOCK => {
                arity(1)?;
                Ok(Expression::HasBlock(expect_u32(&fields[0], "HasBlock slot")?))
            }
            tags::HAS_BLOCK_PARAMS => {
                arity(1)?;
                Ok(Expression::HasBlockParams(expect_u32(
                    &fields[0],
                    "HasBlockParams slot",
                )?))
            }
            tags::UNDEFINED => {
                arity(0)?;
                Ok(Expression::Undefined)
            }
            tags::HELPER => {
                arity(3)?;
                Ok(Expression::Helper {
                    name: expect_str(&fields[0], "Helper name")?,
                    params: expect_params(&fields[1], "Helper params")?,
                    hash: expect_hash(&fields[2], "Helper hash")?,
                })
            }
            tags::CONCAT => {
                arity(1)?;
                Ok(Expression::Concat(expect_params(&fields[0], "Concat parts")?))
            }
            other => Err(WireError::UnknownExpressionTag(other)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Expression::StringLiteral(s) => Value::String(s.clone()),
            Expression::NumberLiteral(n) => json!(n),
            Expression::BoolLiteral(b) => Value::Bool(*b),
            Expression::Null => Value::Null,
            Expression::Unknown(name) => json!([tags::UNKNOWN, name]),
            Expression::Get { symbol, path } => json!([tags::GET, symbol, path]),
            Expression::MaybeLocal(path) => json!([tags::MAYBE_LOCAL, path]),
            Expression::HasBlock(slot) => json!([tags::HAS_BLOCK, slot]),
            Expression::HasBlockParams(slot) => json!([tags::HAS_BLOCK_PARAMS, slot]),
            Expression::Undefined => json!([tags::UNDEFINED]),
            Expression::Helper { name, params, hash } => {
                json!([tags::HELPER, name, params_to_value(params), hash_to_value(hash)])
            }
            Expression::Concat(parts) => json!([tags::CONCAT, params_to_value(parts)]),
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expression::from_value(&value).map_err(D::Error::custom)
    }
}

pub(crate) fn expect_tag(items: &[Value], context: &'static str) -> WireResult<u64> {
    items
        .first()
        .and_then(Value::as_u64)
        .ok_or(WireError::shape("numeric opcode tag", context))
}

pub(crate) fn expect_str(value: &Value, context: &'static str) -> WireResult<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or(WireError::shape("string", context))
}

pub(crate) fn expect_opt_str(value: &Value, context: &'static str) -> WireResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(WireError::shape("string or null", context)),
    }
}

pub(crate) fn expect_u32(value: &Value, context: &'static str) -> WireResult<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(WireError::shape("unsigned 32-bit integer", context))
}

pub(crate) fn expect_bool(value: &Value, context: &'static str) -> WireResult<bool> {
    value.as_bool().ok_or(WireError::shape("boolean", context))
}

pub(crate) fn expect_str_array(value: &Value, context: &'static str) -> WireResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or(WireError::shape("array of strings", context))?;
    items.iter().map(|v| expect_str(v, context)).collect()
}

pub(crate) fn expect_params(value: &Value, context: &'static str) -> WireResult<Params> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(Expression::from_value).collect(),
        _ => Err(WireError::shape("array of expressions or null", context)),
    }
}

pub(crate) fn expect_hash(value: &Value, context: &'static str) -> WireResult<Option<Hash>> {
    let pair = match value {
        Value::Null => return Ok(None),
        Value::Array(pair) => pair,
        _ => return Err(WireError::shape("[keys, values] pair or null", context)),
    };
    if pair.len() != 2 {
        return Err(WireError::shape("[keys, values] pair", context));
    }
    let keys = expect_str_array(&pair[0], context)?;
    let values = expect_params(&pair[1], context)?;
    if keys.len() != values.len() {
        return Err(WireError::shape("matching key and value counts", context));
    }
    Ok(Some(Hash { keys, values }))
}

pub(crate) fn params_to_value(params: &Params) -> Value {
    Value::Array(params.iter().map(Expression::to_value).collect())
}

pub(crate) fn hash_to_value(hash: &Option<Hash>) -> Value {
    match hash {
        None => Value::Null,
        Some(Hash { keys, values }) => json!([keys, params_to_value(values)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_expressions() {
        assert_eq!(
            Expression::from_value(&json!("hi")).unwrap(),
            Expression::StringLiteral("hi".to_string())
        );
        assert_eq!(
            Expression::from_value(&json!(2.5)).unwrap(),
            Expression::NumberLiteral(2.5)
        );
        assert_eq!(
            Expression::from_value(&json!(true)).unwrap(),
            Expression::BoolLiteral(true)
        );
        assert_eq!(Expression::from_value(&Value::Null).unwrap(), Expression::Null);
    }

    #[test]
    fn test_helper_roundtrip() {
        let wire = json!([26, "foo", [[21, 0, ["bar"]]], [["key"], ["value"]]]);
        let expr = Expression::from_value(&wire).unwrap();

        match &expr {
            Expression::Helper { name, params, hash } => {
                assert_eq!(name, "foo");
                assert_eq!(params.len(), 1);
                assert_eq!(hash.as_ref().unwrap().keys, vec!["key".to_string()]);
            }
            other => panic!("expected helper, got {:?}", other),
        }

        assert_eq!(expr.to_value(), wire);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = Expression::from_value(&json!([99, "nope"])).unwrap_err();
        assert!(matches!(err, WireError::UnknownExpressionTag(99)));
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let err = Expression::from_value(&json!([21, 0])).unwrap_err();
        assert!(matches!(
            err,
            WireError::ExpressionArity {
                tag: 21,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_mismatched_hash_lengths_rejected() {
        let err = Expression::from_value(&json!([26, "f", [], [["a", "b"], ["x"]]])).unwrap_err();
        assert!(matches!(err, WireError::Shape { .. }));
    }
}
