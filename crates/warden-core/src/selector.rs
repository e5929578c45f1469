//! Attribute-predicate selector grammar.
//!
//! Two shapes are recognized:
//!
//! ```text
//! Identifier[name='X']
//! CallExpression[callee.object.name='O'][callee.property.name='P']
//! ```
//!
//! Anything else is rejected. The grammar is deliberately tiny; widening it
//! means extending this parser, not loosening the regexes.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::{Result, WardenError};

lazy_static! {
    static ref IDENTIFIER_RE: Regex =
        Regex::new(r"^Identifier\[name='([A-Za-z_$][A-Za-z0-9_$]*)'\]$").unwrap();
    static ref CALL_RE: Regex = Regex::new(
        r"^CallExpression\[callee\.object\.name='([A-Za-z_$][A-Za-z0-9_$]*)'\]\[callee\.property\.name='([A-Za-z_$][A-Za-z0-9_$]*)'\]$"
    )
    .unwrap();
}

/// Typed query produced from a selector string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Selector {
    Identifier { name: String },
    CallExpression { object: String, property: String },
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if let Some(caps) = IDENTIFIER_RE.captures(trimmed) {
            return Ok(Self::Identifier {
                name: caps[1].to_string(),
            });
        }
        if let Some(caps) = CALL_RE.captures(trimmed) {
            return Ok(Self::CallExpression {
                object: caps[1].to_string(),
                property: caps[2].to_string(),
            });
        }
        Err(WardenError::InvalidSelector(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifier_selector() {
        let sel = Selector::parse("Identifier[name='UserId']").unwrap();
        assert_eq!(
            sel,
            Selector::Identifier {
                name: "UserId".to_string()
            }
        );
    }

    #[test]
    fn parses_call_expression_selector() {
        let sel = Selector::parse(
            "CallExpression[callee.object.name='auth'][callee.property.name='login']",
        )
        .unwrap();
        assert_eq!(
            sel,
            Selector::CallExpression {
                object: "auth".to_string(),
                property: "login".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        for input in [
            "Identifier",
            "Identifier[name=UserId]",
            "MemberExpression[name='x']",
            "Identifier[name='a'][extra='b']",
            "CallExpression[callee.object.name='a']",
            "",
        ] {
            let err = Selector::parse(input).unwrap_err();
            assert_eq!(err.code(), "InvalidSelector", "input {input:?}");
        }
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert!(Selector::parse("  Identifier[name='x']  ").is_ok());
    }
}
