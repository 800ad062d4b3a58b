//! Fluent constructors for syntax nodes, used to assemble scripts in
//! code and by the formatter round-trip tests.

use crate::ast::{SyntaxNode, Value};
use crate::token::Span;

impl SyntaxNode {
    /// Create a node with no arguments and no children.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: Vec::new(),
            children: Vec::new(),
            span: Span::default(),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, value: Value) -> Self {
        self.arguments.push(value);
        self
    }

    /// Append a number argument.
    #[must_use]
    pub fn number(self, n: i64) -> Self {
        self.arg(Value::Number(n))
    }

    /// Append a quoted string argument.
    #[must_use]
    pub fn text(self, s: &str) -> Self {
        self.arg(Value::Str(s.to_string()))
    }

    /// Append a chain of bare words: `words(&["a", "b"])` reads as
    /// `a b`.
    #[must_use]
    pub fn words(self, words: &[&str]) -> Self {
        match Value::chain(words) {
            Some(chain) => self.arg(chain),
            None => self,
        }
    }

    /// Append a child node.
    #[must_use]
    pub fn child(mut self, node: Self) -> Self {
        self.children.push(node);
        self
    }

    /// Replace the child block.
    #[must_use]
    pub fn children(mut self, nodes: Vec<Self>) -> Self {
        self.children = nodes;
        self
    }

    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl Value {
    /// A bare word.
    #[must_use]
    pub fn word(name: &str) -> Self {
        Self::Call(SyntaxNode::new(name))
    }

    /// Nest `words` into the right-leaning call chain the parser
    /// produces for `w0 w1 w2 ...`.
    #[must_use]
    pub fn chain(words: &[&str]) -> Option<Self> {
        let (last, init) = words.split_last()?;
        let mut value = Self::word(last);
        for word in init.iter().rev() {
            value = Self::Call(SyntaxNode::new(word).arg(value));
        }
        Some(value)
    }

    /// A bracketed group.
    #[must_use]
    pub const fn group(values: Vec<Self>) -> Self {
        Self::List(values)
    }

    /// An operator expression `(op operands...)`.
    #[must_use]
    pub fn op(name: &str, operands: Vec<Self>) -> Self {
        let mut call = SyntaxNode::new(name);
        call.arguments = operands;
        Self::List(vec![Self::Call(call)])
    }
}
