//! Serialized block and template containers

use crate::error::WireResult;
use crate::statement::Statement;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inline block: the body of a nested block invocation, plus the symbol
/// slots its block parameters bind to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedInlineBlock {
    pub statements: Vec<Statement>,
    pub parameters: Vec<u32>,
}

impl SerializedInlineBlock {
    pub fn from_value(value: &Value) -> WireResult<SerializedInlineBlock> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("inline block serialization is infallible")
    }
}

/// A top-level template block: statements plus the ordered symbol table of
/// variable names used for scope slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTemplateBlock {
    pub statements: Vec<Statement>,
    pub symbols: Vec<String>,
    pub has_eval: bool,
}

/// Compile-time locator metadata carried through compilation untouched.
/// The module field is a producer-side placeholder; the locator payload is
/// opaque to the compiler and round-trips into interned handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateReferrer {
    pub module: String,
    pub locator: Value,
}

impl TemplateReferrer {
    pub fn anonymous() -> Self {
        TemplateReferrer {
            module: "(unknown template module)".to_string(),
            locator: Value::Null,
        }
    }
}

/// A full serialized template: block content paired with referrer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTemplate {
    pub block: SerializedTemplateBlock,
    pub referrer: TemplateReferrer,
}

impl SerializedTemplate {
    /// Parse a template from its persisted JSON string form.
    pub fn from_json(source: &str) -> WireResult<SerializedTemplate> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("template serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_roundtrip() {
        let source = json!({
            "block": {
                "statements": [[0, "hello "], [1, [20, "name"], false]],
                "symbols": ["name"],
                "hasEval": false
            },
            "referrer": {"module": "app/templates/greeting", "locator": {"name": "greeting"}}
        })
        .to_string();

        let template = SerializedTemplate::from_json(&source).unwrap();
        assert_eq!(template.block.symbols, vec!["name".to_string()]);
        assert_eq!(template.block.statements.len(), 2);
        assert!(!template.block.has_eval);

        let reparsed = SerializedTemplate::from_json(&template.to_json()).unwrap();
        assert_eq!(reparsed, template);
    }

    #[test]
    fn test_inline_block_roundtrip() {
        let block = SerializedInlineBlock {
            statements: vec![Statement::Text("body".to_string())],
            parameters: vec![1, 2],
        };
        let reparsed = SerializedInlineBlock::from_value(&block.to_value()).unwrap();
        assert_eq!(reparsed, block);
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let source = json!({
            "block": {
                "statements": [[99, "bogus"]],
                "symbols": [],
                "hasEval": false
            },
            "referrer": {"module": "m", "locator": null}
        })
        .to_string();

        assert!(SerializedTemplate::from_json(&source).is_err());
    }
}
