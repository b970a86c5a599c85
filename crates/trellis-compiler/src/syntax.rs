//! Syntax dispatch registries
//!
//! Explicit registry objects mapping wire tags to compiling functions,
//! constructed once and passed by reference. Dispatch is by slot index
//! keyed from a tag map populated at registration time. A lookup miss is a
//! programming defect (a corrupted wire format would have failed to decode;
//! a missing registration means an unimplemented language feature) and
//! panics rather than being skipped.

use crate::builder::OpcodeBuilder;
use crate::error::CompileResult;
use crate::expressions;
use crate::macros::{standard_blocks, standard_inlines, Blocks, Inlines};
use crate::statements;
use indexmap::IndexMap;
use trellis_wire::{tags, Expression, Statement};

pub type StatementFn =
    for<'a, 'c> fn(&Statement, &mut OpcodeBuilder<'a, 'c>) -> CompileResult<()>;
pub type ExpressionFn =
    for<'a, 'c> fn(&Expression, &mut OpcodeBuilder<'a, 'c>) -> CompileResult<()>;

pub struct StatementCompilers {
    slots: IndexMap<u64, usize>,
    funcs: Vec<StatementFn>,
}

impl StatementCompilers {
    pub fn new() -> Self {
        StatementCompilers {
            slots: IndexMap::new(),
            funcs: Vec::new(),
        }
    }

    pub fn add(&mut self, tag: u64, f: StatementFn) {
        let slot = self.funcs.len();
        let previous = self.slots.insert(tag, slot);
        assert!(previous.is_none(), "statement tag {tag} registered twice");
        self.funcs.push(f);
    }

    pub fn get(&self, tag: u64) -> StatementFn {
        let slot = self
            .slots
            .get(&tag)
            .unwrap_or_else(|| panic!("no implementation registered for statement tag {tag}"));
        self.funcs[*slot]
    }
}

impl Default for StatementCompilers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ExpressionCompilers {
    slots: IndexMap<u64, usize>,
    funcs: Vec<ExpressionFn>,
}

impl ExpressionCompilers {
    pub fn new() -> Self {
        ExpressionCompilers {
            slots: IndexMap::new(),
            funcs: Vec::new(),
        }
    }

    pub fn add(&mut self, tag: u64, f: ExpressionFn) {
        let slot = self.funcs.len();
        let previous = self.slots.insert(tag, slot);
        assert!(previous.is_none(), "expression tag {tag} registered twice");
        self.funcs.push(f);
    }

    pub fn get(&self, tag: u64) -> ExpressionFn {
        let slot = self
            .slots
            .get(&tag)
            .unwrap_or_else(|| panic!("no implementation registered for expression tag {tag}"));
        self.funcs[*slot]
    }
}

impl Default for ExpressionCompilers {
    fn default() -> Self {
        Self::new()
    }
}

/// The full dispatch surface for one compiler configuration. Independent
/// configurations (differing macro sets) can coexist; nothing here is
/// global.
pub struct Syntax {
    pub statements: StatementCompilers,
    pub expressions: ExpressionCompilers,
    pub blocks: Blocks,
    pub inlines: Inlines,
}

impl Syntax {
    /// The standard statement and expression compilers with the built-in
    /// macro set.
    pub fn standard() -> Syntax {
        Syntax::with_macros(standard_blocks(), standard_inlines())
    }

    /// Standard tag dispatch with a caller-supplied macro set.
    pub fn with_macros(blocks: Blocks, inlines: Inlines) -> Syntax {
        let mut stmts = StatementCompilers::new();
        stmts.add(tags::TEXT, statements::text);
        stmts.add(tags::APPEND, statements::append);
        stmts.add(tags::COMMENT, statements::comment);
        stmts.add(tags::MODIFIER, statements::modifier);
        stmts.add(tags::BLOCK, statements::block);
        stmts.add(tags::COMPONENT, statements::component);
        stmts.add(tags::OPEN_ELEMENT, statements::open_element);
        stmts.add(tags::FLUSH_ELEMENT, statements::flush_element);
        stmts.add(tags::CLOSE_ELEMENT, statements::close_element);
        stmts.add(tags::STATIC_ATTR, statements::static_attr);
        stmts.add(tags::DYNAMIC_ATTR, statements::dynamic_attr);
        stmts.add(tags::ATTR_SPLAT, statements::attr_splat);
        stmts.add(tags::YIELD, statements::yield_);
        stmts.add(tags::PARTIAL, statements::partial);
        stmts.add(tags::DYNAMIC_ARG, statements::dynamic_arg);
        stmts.add(tags::TRUSTING_ATTR, statements::trusting_attr);
        stmts.add(tags::DEBUGGER, statements::debugger);

        let mut exprs = ExpressionCompilers::new();
        exprs.add(tags::UNKNOWN, expressions::unknown);
        exprs.add(tags::GET, expressions::get);
        exprs.add(tags::MAYBE_LOCAL, expressions::maybe_local);
        exprs.add(tags::HAS_BLOCK, expressions::has_block);
        exprs.add(tags::HAS_BLOCK_PARAMS, expressions::has_block_params);
        exprs.add(tags::UNDEFINED, expressions::undefined);
        exprs.add(tags::HELPER, expressions::helper);
        exprs.add(tags::CONCAT, expressions::concat);

        Syntax {
            statements: stmts,
            expressions: exprs,
            blocks,
            inlines,
        }
    }
}

impl Default for Syntax {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_syntax_covers_all_statement_tags() {
        let syntax = Syntax::standard();
        for tag in [
            tags::TEXT,
            tags::APPEND,
            tags::COMMENT,
            tags::MODIFIER,
            tags::BLOCK,
            tags::COMPONENT,
            tags::OPEN_ELEMENT,
            tags::FLUSH_ELEMENT,
            tags::CLOSE_ELEMENT,
            tags::STATIC_ATTR,
            tags::DYNAMIC_ATTR,
            tags::ATTR_SPLAT,
            tags::YIELD,
            tags::PARTIAL,
            tags::DYNAMIC_ARG,
            tags::TRUSTING_ATTR,
            tags::DEBUGGER,
        ] {
            let _ = syntax.statements.get(tag);
        }
    }

    #[test]
    #[should_panic(expected = "no implementation registered for statement tag")]
    fn test_unregistered_tag_panics() {
        let registry = StatementCompilers::new();
        let _ = registry.get(3);
    }
}
