//! Statement nodes of the wire format

use crate::block::SerializedInlineBlock;
use crate::error::{WireError, WireResult};
use crate::expression::{
    expect_bool, expect_hash, expect_opt_str, expect_params, expect_str, expect_str_array,
    expect_tag, expect_u32, hash_to_value, params_to_value, Expression, Hash, Params,
};
use crate::tags;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Nested blocks of a block or component invocation, keyed by name
/// (`default`, `else`, ...). Preserves producer order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedBlocks(pub IndexMap<String, SerializedInlineBlock>);

impl NamedBlocks {
    pub fn get(&self, name: &str) -> Option<&SerializedInlineBlock> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_value(value: &Value, context: &'static str) -> WireResult<NamedBlocks> {
        let entries = match value {
            Value::Null => return Ok(NamedBlocks::default()),
            Value::Object(entries) => entries,
            _ => return Err(WireError::shape("named block map or null", context)),
        };
        let mut blocks = IndexMap::new();
        for (name, block) in entries {
            blocks.insert(name.clone(), SerializedInlineBlock::from_value(block)?);
        }
        Ok(NamedBlocks(blocks))
    }

    fn to_value(&self) -> Value {
        if self.0.is_empty() {
            return Value::Null;
        }
        let entries = self
            .0
            .iter()
            .map(|(name, block)| (name.clone(), block.to_value()));
        Value::Object(entries.collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Text(String),
    Append {
        value: Expression,
        trusting: bool,
    },
    Comment(String),
    Modifier {
        name: String,
        params: Params,
        hash: Option<Hash>,
    },
    Block {
        name: String,
        params: Params,
        hash: Option<Hash>,
        blocks: NamedBlocks,
    },
    Component {
        tag: String,
        attrs: Vec<Statement>,
        hash: Option<Hash>,
        blocks: NamedBlocks,
    },
    OpenElement(String),
    FlushElement,
    CloseElement,
    StaticAttr {
        name: String,
        value: String,
        namespace: Option<String>,
    },
    DynamicAttr {
        name: String,
        value: Expression,
        namespace: Option<String>,
    },
    AttrSplat(u32),
    Yield {
        to: u32,
        params: Params,
    },
    Partial {
        target: Expression,
        eval_symbols: Vec<String>,
    },
    DynamicArg {
        name: String,
        value: Expression,
    },
    TrustingAttr {
        name: String,
        value: Expression,
        namespace: Option<String>,
    },
    Debugger {
        eval_symbols: Vec<String>,
    },
}

impl Statement {
    /// The numeric wire tag this statement was decoded from.
    pub fn tag(&self) -> u64 {
        match self {
            Statement::Text(_) => tags::TEXT,
            Statement::Append { .. } => tags::APPEND,
            Statement::Comment(_) => tags::COMMENT,
            Statement::Modifier { .. } => tags::MODIFIER,
            Statement::Block { .. } => tags::BLOCK,
            Statement::Component { .. } => tags::COMPONENT,
            Statement::OpenElement(_) => tags::OPEN_ELEMENT,
            Statement::FlushElement => tags::FLUSH_ELEMENT,
            Statement::CloseElement => tags::CLOSE_ELEMENT,
            Statement::StaticAttr { .. } => tags::STATIC_ATTR,
            Statement::DynamicAttr { .. } => tags::DYNAMIC_ATTR,
            Statement::AttrSplat(_) => tags::ATTR_SPLAT,
            Statement::Yield { .. } => tags::YIELD,
            Statement::Partial { .. } => tags::PARTIAL,
            Statement::DynamicArg { .. } => tags::DYNAMIC_ARG,
            Statement::TrustingAttr { .. } => tags::TRUSTING_ATTR,
            Statement::Debugger { .. } => tags::DEBUGGER,
        }
    }

    pub fn from_value(value: &Value) -> WireResult<Statement> {
        let items = value
            .as_array()
            .ok_or(WireError::shape("tagged tuple", "statement"))?;
        let tag = expect_tag(items, "statement")?;
        let fields = &items[1..];

        let arity = |expected: usize| -> WireResult<()> {
            if fields.len() == expected {
                Ok(())
            } else {
                Err(WireError::StatementArity {
                    tag,
                    expected,
                    actual: fields.len(),
                })
            }
        };
        // Attribute statements carry an optional trailing namespace field.
        let attr_arity = || -> WireResult<Option<&Value>> {
            match fields.len() {
                2 => Ok(None),
                3 => Ok(Some(&fields[2])),
                actual => Err(WireError::StatementArity {
                    tag,
                    expected: 3,
                    actual,
                }),
            }
        };

        match tag {
            tags::TEXT => {
                arity(1)?;
                Ok(Statement::Text(expect_str(&fields[0], "Text content")?))
            }
            tags::APPEND => {
                arity(2)?;
                Ok(Statement::Append {
                    value: Expression::from_value(&fields[0])?,
                    trusting: expect_bool(&fields[1], "Append trusting flag")?,
                })
            }
            tags::COMMENT => {
                arity(1)?;
                Ok(Statement::Comment(expect_str(&fields[0], "Comment content")?))
            }
            tags::MODIFIER => {
                arity(3)?;
                Ok(Statement::Modifier {
                    name: expect_str(&fields[0], "Modifier name")?,
                    params: expect_params(&fields[1], "Modifier params")?,
                    hash: expect_hash(&fields[2], "Modifier hash")?,
                })
            }
            tags::BLOCK => {
                arity(4)?;
                Ok(Statement::Block {
                    name: expect_str(&fields[0], "Block name")?,
                    params: expect_params(&fields[1], "Block params")?,
                    hash: expect_hash(&fields[2], "Block hash")?,
                    blocks: NamedBlocks::from_value(&fields[3], "Block named blocks")?,
                })
            }
            tags::COMPONENT => {
                arity(4)?;
                let attrs = fields[1]
                    .as_array()
                    .ok_or(WireError::shape("attribute statement list", "Component"))?
                    .iter()
                    .map(Statement::from_value)
                    .collect::<WireResult<Vec<_>>>()?;
                Ok(Statement::Component {
                    tag: expect_str(&fields[0], "Component tag")?,
                    attrs,
                    hash: expect_hash(&fields[2], "Component hash")?,
                    blocks: NamedBlocks::from_value(&fields[3], "Component named blocks")?,
                })
            }
            tags::OPEN_ELEMENT => {
                arity(1)?;
                Ok(Statement::OpenElement(expect_str(
                    &fields[0],
                    "OpenElement tag",
                )?))
            }
            tags::FLUSH_ELEMENT => {
                arity(0)?;
                Ok(Statement::FlushElement)
            }
            tags::CLOSE_ELEMENT => {
                arity(0)?;
                Ok(Statement::CloseElement)
            }
            tags::STATIC_ATTR => {
                let namespace = attr_arity()?;
                Ok(Statement::StaticAttr {
                    name: expect_str(&fields[0], "StaticAttr name")?,
                    value: expect_str(&fields[1], "StaticAttr value")?,
                    namespace: namespace
                        .map(|v| expect_opt_str(v, "StaticAttr namespace"))
                        .transpose()?
                        .flatten(),
                })
            }
            tags::DYNAMIC_ATTR => {
                let namespace = attr_arity()?;
                Ok(Statement::DynamicAttr {
                    name: expect_str(&fields[0], "DynamicAttr name")?,
                    value: Expression::from_value(&fields[1])?,
                    namespace: namespace
                        .map(|v| expect_opt_str(v, "DynamicAttr namespace"))
                        .transpose()?
                        .flatten(),
                })
            }
            tags::ATTR_SPLAT => {
                arity(1)?;
                Ok(Statement::AttrSplat(expect_u32(&fields[0], "AttrSplat slot")?))
            }
            tags::YIELD => {
                arity(2)?;
                Ok(Statement::Yield {
                    to: expect_u32(&fields[0], "Yield target slot")?,
                    params: expect_params(&fields[1], "Yield params")?,
                })
            }
            tags::PARTIAL => {
                arity(2)?;
                Ok(Statement::Partial {
                    target: Expression::from_value(&fields[0])?,
                    eval_symbols: expect_str_array(&fields[1], "Partial eval symbols")?,
                })
            }
            tags::DYNAMIC_ARG => {
                arity(2)?;
                Ok(Statement::DynamicArg {
                    name: expect_str(&fields[0], "DynamicArg name")?,
                    value: Expression::from_value(&fields[1])?,
                })
            }
            tags::TRUSTING_ATTR => {
                let namespace = attr_arity()?;
                Ok(Statement::TrustingAttr {
                    name: expect_str(&fields[0], "TrustingAttr name")?,
                    value: Expression::from_value(&fields[1])?,
                    namespace: namespace
                        .map(|v| expect_opt_str(v, "TrustingAttr namespace"))
                        .transpose()?
                        .flatten(),
                })
            }
            tags::DEBUGGER => {
                arity(1)?;
                Ok(Statement::Debugger {
                    eval_symbols: expect_str_array(&fields[0], "Debugger eval symbols")?,
                })
            }
            other => Err(WireError::UnknownStatementTag(other)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Statement::Text(text) => json!([tags::TEXT, text]),
            Statement::Append { value, trusting } => {
                json!([tags::APPEND, value.to_value(), trusting])
            }
            Statement::Comment(text) => json!([tags::COMMENT, text]),
            Statement::Modifier { name, params, hash } => {
                json!([tags::MODIFIER, name, params_to_value(params), hash_to_value(hash)])
            }
            Statement::Block {
                name,
                params,
                hash,
                blocks,
            } => json!([
                tags::BLOCK,
                name,
                params_to_value(params),
                hash_to_value(hash),
                blocks.to_value()
            ]),
            Statement::Component {
                tag,
                attrs,
                hash,
                blocks,
            } => {
                let attrs: Vec<Value> = attrs.iter().map(Statement::to_value).collect();
                json!([tags::COMPONENT, tag, attrs, hash_to_value(hash), blocks.to_value()])
            }
            Statement::OpenElement(tag) => json!([tags::OPEN_ELEMENT, tag]),
            Statement::FlushElement => json!([tags::FLUSH_ELEMENT]),
            Statement::CloseElement => json!([tags::CLOSE_ELEMENT]),
            Statement::StaticAttr {
                name,
                value,
                namespace,
            } => json!([tags::STATIC_ATTR, name, value, namespace]),
            Statement::DynamicAttr {
                name,
                value,
                namespace,
            } => json!([tags::DYNAMIC_ATTR, name, value.to_value(), namespace]),
            Statement::AttrSplat(slot) => json!([tags::ATTR_SPLAT, slot]),
            Statement::Yield { to, params } => {
                json!([tags::YIELD, to, params_to_value(params)])
            }
            Statement::Partial {
                target,
                eval_symbols,
            } => json!([tags::PARTIAL, target.to_value(), eval_symbols]),
            Statement::DynamicArg { name, value } => {
                json!([tags::DYNAMIC_ARG, name, value.to_value()])
            }
            Statement::TrustingAttr {
                name,
                value,
                namespace,
            } => json!([tags::TRUSTING_ATTR, name, value.to_value(), namespace]),
            Statement::Debugger { eval_symbols } => json!([tags::DEBUGGER, eval_symbols]),
        }
    }
}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Statement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Statement::from_value(&value).map_err(D::Error::custom)
    }
}
