//! Pretty-printer that turns syntax nodes back into script text.
//!
//! Produces four-space indentation and one node per line. Any tree the
//! parser produces formats to text that parses back to the same tree.

use crate::ast::{SyntaxNode, Value};

const INDENT: &str = "    ";

/// Format top-level syntax nodes as a script.
#[must_use]
pub fn format(nodes: &[SyntaxNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        format_node(&mut out, node, 0);
    }
    out
}

fn format_node(out: &mut String, node: &SyntaxNode, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    format_call(out, node);
    if node.children.is_empty() {
        out.push('\n');
        return;
    }
    out.push_str(":\n");
    for child in &node.children {
        format_node(out, child, depth + 1);
    }
}

fn format_call(out: &mut String, node: &SyntaxNode) {
    let mut link = node;
    loop {
        out.push_str(&link.name);
        let (next, init) = match link.arguments.split_last() {
            Some((Value::Call(next), init)) => (Some(next), init),
            _ => (None, link.arguments.as_slice()),
        };
        for value in init {
            out.push(' ');
            format_value(out, value);
        }
        match next {
            Some(next) => {
                out.push(' ');
                link = next;
            }
            None => break,
        }
    }
}

fn format_value(out: &mut String, value: &Value) {
    match value {
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Str(s) => format_string(out, s),
        Value::Call(node) => format_call(out, node),
        Value::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                format_value(out, item);
            }
            out.push(')');
        }
    }
}

fn format_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks() {
        let nodes = vec![
            SyntaxNode::new("target")
                .words(&["build", "depends", "compile"])
                .child(SyntaxNode::new("echo").text("done")),
        ];
        assert_eq!(
            format(&nodes),
            "target build depends compile:\n    echo \"done\"\n"
        );
    }

    #[test]
    fn groups_and_escapes() {
        let nodes = vec![
            SyntaxNode::new("set")
                .arg(Value::group(vec![Value::word("x"), Value::Number(1)]))
                .text("a \"b\"\n"),
        ];
        assert_eq!(format(&nodes), "set (x 1) \"a \\\"b\\\"\\n\"\n");
    }
}
