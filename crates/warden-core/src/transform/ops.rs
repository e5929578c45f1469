//! The v1 AST operations, expressed as byte-range edits.
//!
//! Edits are computed against the parsed tree, then spliced into the source
//! text from the last edit backwards so earlier offsets never shift. The
//! surrounding text (whitespace, comments) is untouched by construction.

use tree_sitter::{Node, Tree};

use crate::changespec::PatchDetails;

/// One replacement of a byte range in the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// Splice edits into the source, back to front.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut output = source.to_string();
    for edit in edits {
        output.replace_range(edit.start..edit.end, &edit.replacement);
    }
    output
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn collect_nodes<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        out.push(child);
        collect_nodes(child, out);
    }
}

fn all_nodes(tree: &Tree) -> Vec<Node<'_>> {
    let mut nodes = vec![tree.root_node()];
    collect_nodes(tree.root_node(), &mut nodes);
    nodes
}

/// Rewrite every identifier token whose text equals `name`.
///
/// Token-level by design: there is no binding analysis, so shadowed
/// bindings rename too. Callers surface that as a warning.
pub fn rename_symbol_edits(tree: &Tree, source: &str, name: &str, new_name: &str) -> Vec<Edit> {
    all_nodes(tree)
        .into_iter()
        .filter(|node| {
            node.child_count() == 0
                && node.kind().ends_with("identifier")
                && node_text(*node, source) == name
        })
        .map(|node| Edit {
            start: node.start_byte(),
            end: node.end_byte(),
            replacement: new_name.to_string(),
        })
        .collect()
}

/// Rewrite call sites of `object.property(...)`.
///
/// `details.new_property` renames the callee property; `details.args_map`
/// renames matching keys inside object-literal arguments.
pub fn replace_api_edits(
    tree: &Tree,
    source: &str,
    object: &str,
    property: &str,
    details: &PatchDetails,
) -> Vec<Edit> {
    let mut edits = Vec::new();

    for node in all_nodes(tree) {
        if node.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = node.child_by_field_name("function") else {
            continue;
        };
        if callee.kind() != "member_expression" {
            continue;
        }
        let (Some(obj), Some(prop)) = (
            callee.child_by_field_name("object"),
            callee.child_by_field_name("property"),
        ) else {
            continue;
        };
        if obj.kind() != "identifier"
            || node_text(obj, source) != object
            || node_text(prop, source) != property
        {
            continue;
        }

        if let Some(new_property) = &details.new_property {
            edits.push(Edit {
                start: prop.start_byte(),
                end: prop.end_byte(),
                replacement: new_property.clone(),
            });
        }

        if let Some(args_map) = &details.args_map {
            let Some(args) = node.child_by_field_name("arguments") else {
                continue;
            };
            let mut args_cursor = args.walk();
            for arg in args.named_children(&mut args_cursor) {
                if arg.kind() != "object" {
                    continue;
                }
                let mut pair_cursor = arg.walk();
                for pair in arg.named_children(&mut pair_cursor) {
                    if pair.kind() != "pair" {
                        continue;
                    }
                    let Some(key) = pair.child_by_field_name("key") else {
                        continue;
                    };
                    if key.kind() != "property_identifier" {
                        continue;
                    }
                    if let Some(new_key) = args_map.get(node_text(key, source)) {
                        edits.push(Edit {
                            start: key.start_byte(),
                            end: key.end_byte(),
                            replacement: new_key.clone(),
                        });
                    }
                }
            }
        }
    }

    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::lang::{LanguagePack, TsJsPack};
    use crate::types::Language;
    use std::collections::HashMap;
    use std::path::Path;

    fn parse_ts(source: &str) -> Tree {
        TsJsPack::new(Language::Typescript)
            .parse(source, Path::new("test.ts"))
            .unwrap()
    }

    #[test]
    fn rename_rewrites_every_matching_identifier() {
        let source = "export type UserId = string;\nconst u: UserId = '1';\n";
        let tree = parse_ts(source);
        let edits = rename_symbol_edits(&tree, source, "UserId", "AccountId");
        assert_eq!(edits.len(), 2);

        let output = apply_edits(source, edits);
        assert_eq!(
            output,
            "export type AccountId = string;\nconst u: AccountId = '1';\n"
        );
    }

    #[test]
    fn rename_leaves_other_identifiers_alone() {
        let source = "const userId = 1; const other = userId + 2;";
        let tree = parse_ts(source);
        let edits = rename_symbol_edits(&tree, source, "UserId", "AccountId");
        assert!(edits.is_empty());
    }

    #[test]
    fn rename_is_idempotent_when_target_is_fresh() {
        let source = "const alpha = 1;\nconsole.log(alpha);\n";
        let tree = parse_ts(source);
        let once = apply_edits(source, rename_symbol_edits(&tree, source, "alpha", "beta"));

        let tree2 = parse_ts(&once);
        let twice = apply_edits(&once, rename_symbol_edits(&tree2, &once, "alpha", "beta"));
        assert_eq!(once, twice);
    }

    #[test]
    fn replace_api_renames_property_and_argument_keys() {
        let source = "auth.login({ username: 'a', password: 'b' });\n";
        let tree = parse_ts(source);
        let details = PatchDetails {
            new_name: None,
            new_property: Some("signIn".to_string()),
            args_map: Some(HashMap::from([(
                "username".to_string(),
                "email".to_string(),
            )])),
        };

        let edits = replace_api_edits(&tree, source, "auth", "login", &details);
        let output = apply_edits(source, edits);
        assert_eq!(output, "auth.signIn({ email: 'a', password: 'b' });\n");
    }

    #[test]
    fn replace_api_ignores_other_callees() {
        let source = "session.login({ username: 'a' });\nauth.logout();\n";
        let tree = parse_ts(source);
        let details = PatchDetails {
            new_name: None,
            new_property: Some("signIn".to_string()),
            args_map: None,
        };
        assert!(replace_api_edits(&tree, source, "auth", "login", &details).is_empty());
    }

    #[test]
    fn replace_api_handles_multiple_call_sites() {
        let source = "auth.login({ username: 'a' });\nauth.login({ username: 'b' });\n";
        let tree = parse_ts(source);
        let details = PatchDetails {
            new_name: None,
            new_property: Some("signIn".to_string()),
            args_map: Some(HashMap::from([(
                "username".to_string(),
                "email".to_string(),
            )])),
        };
        let output = apply_edits(
            source,
            replace_api_edits(&tree, source, "auth", "login", &details),
        );
        assert_eq!(output, "auth.signIn({ email: 'a' });\nauth.signIn({ email: 'b' });\n");
    }
}
