//! Language packs: the per-language capability set behind the engine.
//!
//! A pack knows how to parse, locate patch targets, serialize edits, and
//! validate output. The TS/JS pack is real; Python and Java are registered
//! stubs so the registry shape stays uniform.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::{Parser, Tree};

use crate::changespec::Patch;
use crate::error::{Result, WardenError};
use crate::selector::Selector;
use crate::types::Language;

use super::ops::{self, Edit};

/// Capability set implemented per language.
pub trait LanguagePack: Send + Sync {
    fn language(&self) -> Language;

    /// Extensions searched by textual invariants and scope resolution.
    fn source_extensions(&self) -> &'static [&'static str];

    /// Parse source into a syntax tree; syntax errors are parse failures.
    fn parse(&self, source: &str, path: &Path) -> Result<Tree>;

    /// Compute the byte-range edits one patch produces on one file.
    fn plan_patch(
        &self,
        tree: &Tree,
        source: &str,
        selector: &Selector,
        patch: &Patch,
    ) -> Result<Vec<Edit>>;

    /// Serialize edits back to text. Whitespace outside edits is preserved.
    fn generate(&self, source: &str, edits: Vec<Edit>) -> String {
        ops::apply_edits(source, edits)
    }

    /// True when the source round-trips through the parser without errors.
    fn validate(&self, source: &str, path: &Path) -> bool {
        self.parse(source, path).is_ok()
    }
}

/// TypeScript/JavaScript pack backed by tree-sitter grammars.
pub struct TsJsPack {
    language: Language,
}

impl TsJsPack {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    fn grammar_for(path: &Path) -> Result<tree_sitter::Language> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "ts" => Ok(tree_sitter_typescript::language_typescript()),
            "tsx" => Ok(tree_sitter_typescript::language_tsx()),
            "js" | "jsx" | "mjs" | "cjs" => Ok(tree_sitter_javascript::language()),
            other => Err(WardenError::Parse {
                path: path.display().to_string(),
                message: format!("no grammar for extension {other:?}"),
            }),
        }
    }
}

impl LanguagePack for TsJsPack {
    fn language(&self) -> Language {
        self.language
    }

    fn source_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx"]
    }

    fn parse(&self, source: &str, path: &Path) -> Result<Tree> {
        let grammar = Self::grammar_for(path)?;
        let mut parser = Parser::new();
        parser.set_language(grammar).map_err(|e| WardenError::Parse {
            path: path.display().to_string(),
            message: format!("grammar initialization failed: {e}"),
        })?;

        let tree = parser.parse(source, None).ok_or_else(|| WardenError::Parse {
            path: path.display().to_string(),
            message: "parser returned no tree".to_string(),
        })?;

        if tree.root_node().has_error() {
            return Err(WardenError::Parse {
                path: path.display().to_string(),
                message: "source contains syntax errors".to_string(),
            });
        }
        Ok(tree)
    }

    fn plan_patch(
        &self,
        tree: &Tree,
        source: &str,
        selector: &Selector,
        patch: &Patch,
    ) -> Result<Vec<Edit>> {
        match selector {
            Selector::Identifier { name } => {
                let new_name = patch
                    .details
                    .new_name
                    .as_deref()
                    .ok_or_else(|| WardenError::InvalidChangeSpec("missing details.newName".into()))?;
                Ok(ops::rename_symbol_edits(tree, source, name, new_name))
            }
            Selector::CallExpression { object, property } => Ok(ops::replace_api_edits(
                tree,
                source,
                object,
                property,
                &patch.details,
            )),
        }
    }
}

/// Placeholder pack for languages the engine does not transform yet.
pub struct StubPack {
    language: Language,
}

impl StubPack {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl LanguagePack for StubPack {
    fn language(&self) -> Language {
        self.language
    }

    fn source_extensions(&self) -> &'static [&'static str] {
        match self.language {
            Language::Python => &["py"],
            Language::Java => &["java"],
            _ => &[],
        }
    }

    fn parse(&self, _source: &str, _path: &Path) -> Result<Tree> {
        Err(WardenError::UnsupportedOperation(format!(
            "{} language pack is a stub",
            self.language
        )))
    }

    fn plan_patch(
        &self,
        _tree: &Tree,
        _source: &str,
        _selector: &Selector,
        _patch: &Patch,
    ) -> Result<Vec<Edit>> {
        Err(WardenError::UnsupportedOperation(format!(
            "{} language pack is a stub",
            self.language
        )))
    }
}

/// Packs registered at startup, keyed by language.
pub struct LanguageRegistry {
    packs: HashMap<Language, Arc<dyn LanguagePack>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            packs: HashMap::new(),
        }
    }

    pub fn with_default_packs() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TsJsPack::new(Language::Typescript)));
        registry.register(Arc::new(TsJsPack::new(Language::Javascript)));
        registry.register(Arc::new(StubPack::new(Language::Python)));
        registry.register(Arc::new(StubPack::new(Language::Java)));
        registry
    }

    pub fn register(&mut self, pack: Arc<dyn LanguagePack>) {
        self.packs.insert(pack.language(), pack);
    }

    pub fn get(&self, language: Language) -> Result<Arc<dyn LanguagePack>> {
        self.packs.get(&language).cloned().ok_or_else(|| {
            WardenError::UnsupportedOperation(format!("no language pack for {language}"))
        })
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_default_packs()
    }
}
