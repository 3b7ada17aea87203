//! `SyntaxParser` boundary: the tree-sitter grammar integration itself is
//! the one piece of IR1 that lives outside this crate's scope (grammar
//! packages, query compilation). What we own is this trait plus two callers
//! of it: `TreeSitterParser` (the real thing, feature-gated) and
//! `RegexFallbackParser` for languages/files it can't handle.

use super::types::FileSyntax;

pub trait SyntaxParser: Send + Sync {
    /// `true` if this parser can meaningfully handle the extension.
    fn supports(&self, ext: &str) -> bool;
    fn parse(&self, content: &str, ext: &str) -> FileSyntax;
}
