//! Parser structure and error tests.

use architect::{
    Event, Lexer, ParseError, ParseErrorKind, Parser, SyntaxError, SyntaxNode, TokenKind, Value,
    parse,
};

#[test]
fn parse_empty_script() {
    assert!(parse("").expect("parse").is_empty());
    assert!(parse("\n\n# nothing here\n").expect("parse").is_empty());
}

#[test]
fn parse_nested_blocks() {
    let nodes = parse(
        "namespace tools:\n    target fmt:\n        echo \"formatting\"\n    target lint:\n        echo lint\n",
    )
    .expect("parse");
    assert_eq!(nodes.len(), 1);
    let ns = &nodes[0];
    assert_eq!(ns.name, "namespace");
    assert_eq!(ns.children.len(), 2);
    assert_eq!(ns.children[0].children[0].arguments, vec![Value::Str("formatting".to_string())]);
    assert_eq!(ns.walk().count(), 5);
}

#[test]
fn parse_groups_and_operators() {
    let nodes = parse("set (x (add 1 2)) (y \"z\")").expect("parse");
    let expected = SyntaxNode::new("set")
        .arg(Value::group(vec![Value::Call(
            SyntaxNode::new("x").arg(Value::op("add", vec![Value::Number(1), Value::Number(2)])),
        )]))
        .arg(Value::group(vec![Value::Call(
            SyntaxNode::new("y").text("z"),
        )]));
    assert_eq!(nodes[0].arguments, expected.arguments);
}

#[test]
fn parse_spans_point_at_names() {
    let nodes = parse("a:\n    b 1\n").expect("parse");
    assert_eq!((nodes[0].span.line, nodes[0].span.column), (1, 1));
    let b = &nodes[0].children[0];
    assert_eq!((b.span.line, b.span.column), (2, 5));
}

#[test]
fn parse_dedent_returns_to_outer_block() {
    let nodes = parse("a:\n    b:\n        c\n    d\ne\n").expect("parse");
    let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["a", "e"]);
    let inner: Vec<&str> = nodes[0].children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(inner, ["b", "d"]);
}

// -----------------------------------------------------------
// Errors.
// -----------------------------------------------------------

#[test]
fn parse_error_unclosed_bracket() {
    let err = parse("echo (a b\n").unwrap_err();
    let SyntaxError::Parse(ParseError { kind, span }) = err else {
        panic!("expected a parse error");
    };
    assert!(matches!(
        kind,
        ParseErrorKind::Expected { ref expected, .. } if expected == &[TokenKind::RBracket]
    ));
    assert_eq!(span.line, 1);
}

#[test]
fn parse_error_node_must_start_with_name() {
    assert!(matches!(
        parse("42 echo\n").unwrap_err(),
        SyntaxError::Parse(ParseError {
            kind: ParseErrorKind::Expected { .. },
            ..
        })
    ));
}

#[test]
fn parse_error_lexer_errors_pass_through() {
    assert!(matches!(
        parse("a:\n    b\n  c\n").unwrap_err(),
        SyntaxError::Lex(_)
    ));
}

#[test]
fn parse_error_has_span() {
    let err = parse("a\nb (\n").unwrap_err();
    assert_eq!(err.span().line, 2);
}

#[test]
fn parse_events_stop_after_error() {
    let events: Vec<_> = Parser::new(Lexer::new("a:\n    b\nc )\nd\n").expect("lex")).collect();
    assert!(matches!(events.last(), Some(Err(_))));
    let ok = events.iter().filter(|e| e.is_ok()).count();
    // a, Enter, b, Exit
    assert_eq!(ok, 4);
    assert!(matches!(events[1], Ok(Event::Enter)));
}
