use crate::token::Span;

/// One parsed call: `name arguments...` plus an optional child block.
///
/// Purely structural. Meaning is assigned later by the node tree
/// builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub name: String,
    pub arguments: Vec<Value>,
    pub children: Vec<Self>,
    pub span: Span,
}

/// Anything that can appear in argument position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer literal.
    Number(i64),
    /// Double-quoted string literal.
    Str(String),
    /// Nested call. Its arguments continue the word chain, so `a b c`
    /// is `Call(a, [Call(b, [Call(c)])])`.
    Call(SyntaxNode),
    /// Bracketed group `( ... )`.
    List(Vec<Self>),
}

impl SyntaxNode {
    /// Whether this node opened a child block.
    #[must_use]
    pub const fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Depth-first walk over this node and its children.
    pub fn walk(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

// Word chains nest one level per word. Unlink them onto a heap stack so
// dropping a long line does not recurse.
impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut values = std::mem::take(&mut self.arguments);
        let mut nodes = std::mem::take(&mut self.children);
        loop {
            if let Some(value) = values.pop() {
                match value {
                    Value::Call(node) => nodes.push(node),
                    Value::List(items) => values.extend(items),
                    Value::Number(_) | Value::Str(_) => {}
                }
            } else if let Some(mut node) = nodes.pop() {
                values.append(&mut node.arguments);
                nodes.append(&mut node.children);
            } else {
                break;
            }
        }
    }
}

impl Value {
    /// The called name when this value is a bare or nested call.
    #[must_use]
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Self::Call(node) => Some(&node.name),
            _ => None,
        }
    }
}
