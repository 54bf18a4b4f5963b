use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser};

/// Finds declaration start lines so chunks can break between definitions
/// instead of through them.
pub struct AstParser {
    parser: Parser,
    targets: &'static [&'static str],
}

fn grammar(language: &str) -> Option<(Language, &'static [&'static str])> {
    let entry: (Language, &'static [&'static str]) = match language {
        "rust" => (
            tree_sitter_rust::LANGUAGE.into(),
            &[
                "function_item",
                "impl_item",
                "trait_item",
                "struct_item",
                "enum_item",
                "mod_item",
            ],
        ),
        "python" => (
            tree_sitter_python::LANGUAGE.into(),
            &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
        ),
        "javascript" => (
            tree_sitter_javascript::LANGUAGE.into(),
            &[
                "function_declaration",
                "method_definition",
                "class_declaration",
                "lexical_declaration",
            ],
        ),
        "typescript" => (
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            &[
                "function_declaration",
                "method_definition",
                "class_declaration",
                "interface_declaration",
                "lexical_declaration",
            ],
        ),
        "go" => (
            tree_sitter_go::LANGUAGE.into(),
            &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
        ),
        "java" => (
            tree_sitter_java::LANGUAGE.into(),
            &[
                "method_declaration",
                "class_declaration",
                "interface_declaration",
                "constructor_declaration",
            ],
        ),
        "swift" => (
            tree_sitter_swift::LANGUAGE.into(),
            &[
                "function_declaration",
                "class_declaration",
                "protocol_declaration",
            ],
        ),
        "c" => (
            tree_sitter_c::LANGUAGE.into(),
            &["function_definition", "struct_specifier", "type_definition"],
        ),
        "cpp" => (
            tree_sitter_cpp::LANGUAGE.into(),
            &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
                "namespace_definition",
                "template_declaration",
            ],
        ),
        "csharp" => (
            tree_sitter_c_sharp::LANGUAGE.into(),
            &[
                "method_declaration",
                "class_declaration",
                "struct_declaration",
                "interface_declaration",
                "constructor_declaration",
            ],
        ),
        "ruby" => (
            tree_sitter_ruby::LANGUAGE.into(),
            &["method", "singleton_method", "class", "module"],
        ),
        "php" => (
            tree_sitter_php::LANGUAGE_PHP.into(),
            &[
                "function_definition",
                "method_declaration",
                "class_declaration",
                "interface_declaration",
                "trait_declaration",
            ],
        ),
        _ => return None,
    };
    Some(entry)
}

impl AstParser {
    /// Parser for a language id, `None` when no grammar is bundled
    pub fn for_language(language: &str) -> Option<Result<Self>> {
        let (lang, targets) = grammar(language)?;
        let mut parser = Parser::new();
        Some(
            parser
                .set_language(&lang)
                .context("Failed to set parser language")
                .map(|_| Self { parser, targets }),
        )
    }

    /// 0-based line indices where a declaration (or the comment block directly
    /// above it) begins. Sorted and deduplicated.
    pub fn boundaries(&mut self, source: &str) -> Result<Vec<usize>> {
        let tree = self
            .parser
            .parse(source, None)
            .context("Failed to parse source code")?;

        let mut lines = Vec::new();
        self.collect(tree.root_node(), &mut lines);
        lines.sort_unstable();
        lines.dedup();
        Ok(lines)
    }

    fn collect(&self, node: Node, out: &mut Vec<usize>) {
        if self.targets.contains(&node.kind()) {
            out.push(leading_comment_start(node));
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect(child, out);
        }
    }
}

/// Walk back over comments that sit directly on the lines above `node`
fn leading_comment_start(node: Node) -> usize {
    let mut start = node.start_position().row;
    let mut current = node;
    while let Some(prev) = current.prev_sibling() {
        if !prev.kind().contains("comment") || prev.end_position().row + 1 < start {
            break;
        }
        start = prev.start_position().row;
        current = prev;
    }
    start
}
