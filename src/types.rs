//! Argument types and the validation that turns raw syntax values into
//! typed node arguments.
//!
//! Raw arguments are first normalised into atoms: a call chain
//! `a b c` is the word sequence `a`, `b`, `c`, and a bracketed group
//! whose first element is an operator (`add`, `sub`, `var`) is an
//! expression. Each node declares a [`Shape`]; [`Shape::validate`]
//! checks the atoms against it once, at construction time. Anything
//! that depends on run-time bindings is wrapped in [`Lazy`] and
//! resolved by the node when it runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{SyntaxNode, Value};
use crate::token::Span;

/// Operators recognised at the head of a bracketed group.
pub const OPERATORS: &[&str] = &["add", "sub", "var"];

/// The closed set of argument types a node may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentType {
    Number,
    String,
    /// Ordered, de-duplicated set of path-like strings.
    FileSet,
    /// Named reference resolved at run time.
    Variable,
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "number",
            Self::String => "string",
            Self::FileSet => "file set",
            Self::Variable => "variable",
        })
    }
}

/// Ordered set of file-path-like strings. Insertion order is kept and
/// duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet(Vec<String>);

impl FileSet {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add `path` unless it is already present.
    pub fn insert(&mut self, path: &str) -> bool {
        if self.contains(path) {
            return false;
        }
        self.0.push(path.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| p == path)
    }

    pub fn extend(&mut self, other: &Self) {
        for path in &other.0 {
            self.insert(path);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for FileSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

/// A resolved run-time value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scalar {
    Number(i64),
    Text(String),
    Files(FileSet),
}

impl Scalar {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Files(_) => "file set",
        }
    }

    /// Convert to the representation `ty` asks for.
    pub fn coerce(self, ty: ArgumentType) -> Result<Self, EvalError> {
        match (ty, self) {
            (ArgumentType::Variable, value)
            | (ArgumentType::Number, value @ Self::Number(_))
            | (ArgumentType::FileSet, value @ Self::Files(_)) => Ok(value),
            (ArgumentType::Number, Self::Text(s)) => {
                s.trim()
                    .parse()
                    .map(Self::Number)
                    .map_err(|_| EvalError::TypeMismatch {
                        expected: ArgumentType::Number,
                        found: "string",
                    })
            }
            (ArgumentType::Number, Self::Files(_)) => Err(EvalError::TypeMismatch {
                expected: ArgumentType::Number,
                found: "file set",
            }),
            (ArgumentType::String, value) => Ok(Self::Text(value.to_string())),
            (ArgumentType::FileSet, value) => {
                Ok(Self::Files(std::iter::once(value.to_string().as_str()).collect()))
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Files(files) => {
                for (i, path) in files.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str(path)?;
                }
                Ok(())
            }
        }
    }
}

/// Errors raised while evaluating an argument at run time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unresolved name '{name}'")]
    UnresolvedName { name: String },
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: ArgumentType,
        found: &'static str,
    },
    #[error("integer overflow")]
    Overflow,
}

/// Variable lookup used by evaluation. Implemented by the scope stack.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Scalar>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
}

/// Expression usable in argument position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Scalar),
    Var(String),
    Bin {
        op: BinOp,
        left: Box<Self>,
        right: Box<Self>,
    },
    /// Items gathered into one file set.
    List(Vec<Self>),
}

impl Expr {
    pub fn eval(&self, scope: &dyn Lookup) -> Result<Scalar, EvalError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Var(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::UnresolvedName { name: name.clone() }),
            Self::Bin { op, left, right } => {
                let left = left.eval(scope)?;
                let right = right.eval(scope)?;
                apply(*op, left, right)
            }
            Self::List(items) => {
                let mut files = FileSet::new();
                for item in items {
                    match item.eval(scope)? {
                        Scalar::Files(more) => files.extend(&more),
                        other => {
                            files.insert(&other.to_string());
                        }
                    }
                }
                Ok(Scalar::Files(files))
            }
        }
    }
}

fn apply(op: BinOp, left: Scalar, right: Scalar) -> Result<Scalar, EvalError> {
    match (op, left, right) {
        (BinOp::Add, Scalar::Number(a), Scalar::Number(b)) => {
            a.checked_add(b).map(Scalar::Number).ok_or(EvalError::Overflow)
        }
        (BinOp::Sub, Scalar::Number(a), Scalar::Number(b)) => {
            a.checked_sub(b).map(Scalar::Number).ok_or(EvalError::Overflow)
        }
        (BinOp::Add, Scalar::Files(mut a), Scalar::Files(b)) => {
            a.extend(&b);
            Ok(Scalar::Files(a))
        }
        (BinOp::Add, a, b) => Ok(Scalar::Text(format!("{a}{b}"))),
        (BinOp::Sub, Scalar::Number(_), other) | (BinOp::Sub, other, _) => {
            Err(EvalError::TypeMismatch {
                expected: ArgumentType::Number,
                found: other.kind(),
            })
        }
    }
}

/// An argument whose value is only known at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lazy {
    pub expr: Expr,
    pub ty: ArgumentType,
}

impl Lazy {
    pub fn resolve(&self, scope: &dyn Lookup) -> Result<Scalar, EvalError> {
        self.expr.eval(scope)?.coerce(self.ty)
    }
}

/// A validated node argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Number(i64),
    Text(String),
    Files(FileSet),
    Variable(String),
    Lazy(Lazy),
}

impl Arg {
    pub fn resolve(&self, scope: &dyn Lookup) -> Result<Scalar, EvalError> {
        match self {
            Self::Number(n) => Ok(Scalar::Number(*n)),
            Self::Text(s) => Ok(Scalar::Text(s.clone())),
            Self::Files(files) => Ok(Scalar::Files(files.clone())),
            Self::Variable(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::UnresolvedName { name: name.clone() }),
            Self::Lazy(lazy) => lazy.resolve(scope),
        }
    }

    /// Literal text, if this argument needs no resolution.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Keyword arguments a node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keys {
    None,
    /// Fixed keyword names, each consuming the atoms that follow it.
    Only(&'static [(&'static str, ArgumentType)]),
    /// Any `key value` pairs, optionally capped.
    Pairs {
        ty: ArgumentType,
        limit: Option<usize>,
    },
}

/// Declared argument shape of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub positional: &'static [ArgumentType],
    /// Type of trailing positional arguments, if any are accepted.
    pub rest: Option<ArgumentType>,
    pub min_rest: usize,
    pub keys: Keys,
    pub allow_children: bool,
}

impl Shape {
    /// Shape of a node that takes nothing.
    pub const EMPTY: Self = Self {
        positional: &[],
        rest: None,
        min_rest: 0,
        keys: Keys::None,
        allow_children: false,
    };
}

/// Arguments after validation against a [`Shape`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub positional: Vec<Arg>,
    /// Keyword arguments in source order. For pair shapes each entry
    /// holds exactly one value.
    pub keywords: Vec<(String, Vec<Arg>)>,
}

impl Args {
    /// All values given for `key`, across repeats.
    pub fn keyword<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Arg> + 'a {
        self.keywords
            .iter()
            .filter(move |(k, _)| k == key)
            .flat_map(|(_, values)| values.iter())
    }
}

/// Classifies a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingArgument { index: usize, expected: ArgumentType },
    UnexpectedArgument(String),
    WrongType { argument: String, expected: ArgumentType },
    /// `set`-style argument that is not a `key value` pair.
    MalformedPair(String),
    PairCount { limit: usize, found: usize },
    BadOperator { op: String, reason: &'static str },
    /// Argument must be known at load time.
    NotLiteral(String),
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArgument { index, expected } => {
                write!(f, "missing {expected} argument #{}", index + 1)
            }
            Self::UnexpectedArgument(arg) => write!(f, "unexpected argument '{arg}'"),
            Self::WrongType { argument, expected } => {
                write!(f, "argument '{argument}' is not a {expected}")
            }
            Self::MalformedPair(arg) => {
                write!(f, "expected 'key value' pair near '{arg}'")
            }
            Self::PairCount { limit, found } => {
                write!(f, "expected at most {limit} pair(s), got {found}")
            }
            Self::BadOperator { op, reason } => write!(f, "operator '{op}': {reason}"),
            Self::NotLiteral(arg) => {
                write!(f, "argument '{arg}' must be a literal")
            }
        }
    }
}

/// Arguments of a node do not fit its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid arguments to '{node}': {kind} at {span}")]
pub struct ValidationError {
    pub node: String,
    pub kind: ValidationErrorKind,
    pub span: Span,
}

/// Normalised argument item.
#[derive(Debug, Clone, Copy)]
enum Atom<'v> {
    Word(&'v str),
    Number(i64),
    Str(&'v str),
    Group(&'v [Value]),
    Op(&'v SyntaxNode),
}

impl Atom<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Word(w) => (*w).to_string(),
            Self::Number(n) => n.to_string(),
            Self::Str(s) => format!("\"{s}\""),
            Self::Group(_) => "(...)".to_string(),
            Self::Op(node) => format!("({} ...)", node.name),
        }
    }
}

fn atoms(values: &[Value]) -> Vec<Atom<'_>> {
    let mut out = Vec::new();
    push_atoms(values, &mut out);
    out
}

fn push_atoms<'v>(values: &'v [Value], out: &mut Vec<Atom<'v>>) {
    for value in values {
        match value {
            Value::Number(n) => out.push(Atom::Number(*n)),
            Value::Str(s) => out.push(Atom::Str(s)),
            Value::Call(node) => {
                // Walk the chain through its trailing call.
                let mut link = node;
                loop {
                    out.push(Atom::Word(&link.name));
                    match link.arguments.split_last() {
                        Some((Value::Call(next), init)) => {
                            push_atoms(init, out);
                            link = next;
                        }
                        _ => {
                            push_atoms(&link.arguments, out);
                            break;
                        }
                    }
                }
            }
            Value::List(items) => match items.as_slice() {
                [Value::Call(head)] if OPERATORS.contains(&head.name.as_str()) => {
                    out.push(Atom::Op(head));
                }
                _ => out.push(Atom::Group(items)),
            },
        }
    }
}

/// Flatten groups away; outside pair shapes brackets only group.
fn ungroup(atoms: Vec<Atom<'_>>) -> Vec<Atom<'_>> {
    let mut out = Vec::with_capacity(atoms.len());
    for atom in atoms {
        match atom {
            Atom::Group(items) => out.extend(ungroup(self::atoms(items))),
            other => out.push(other),
        }
    }
    out
}

impl Shape {
    /// Check `node`'s raw arguments against this shape.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the node and the offending
    /// argument.
    pub fn validate(&self, node: &SyntaxNode) -> Result<Args, ValidationError> {
        let fail = |kind| ValidationError {
            node: node.name.clone(),
            kind,
            span: node.span.clone(),
        };
        let atoms = atoms(&node.arguments);

        if let Keys::Pairs { ty, limit } = self.keys {
            return validate_pairs(&atoms, ty, limit).map_err(fail);
        }

        let mut args = Args::default();
        let mut rest = Vec::new();
        let mut keyword: Option<(&str, ArgumentType)> = None;

        for atom in ungroup(atoms) {
            if let (Atom::Word(word), Keys::Only(keys)) = (atom, self.keys) {
                if args.positional.len() == self.positional.len() {
                    if let Some(&(key, ty)) = keys.iter().find(|(k, _)| *k == word) {
                        keyword = Some((key, ty));
                        args.keywords.push((key.to_string(), Vec::new()));
                        continue;
                    }
                }
            }

            if let Some((_, ty)) = keyword {
                let arg = convert(atom, ty).map_err(fail)?;
                if let Some((_, values)) = args.keywords.last_mut() {
                    values.push(arg);
                }
            } else if let Some(&ty) = self.positional.get(args.positional.len()) {
                args.positional.push(convert(atom, ty).map_err(fail)?);
            } else if let Some(ty) = self.rest {
                rest.push((atom, ty));
            } else {
                return Err(fail(ValidationErrorKind::UnexpectedArgument(
                    atom.describe(),
                )));
            }
        }

        if let Some(&expected) = self.positional.get(args.positional.len()) {
            return Err(fail(ValidationErrorKind::MissingArgument {
                index: args.positional.len(),
                expected,
            }));
        }
        if let Some(ty) = self.rest {
            if rest.len() < self.min_rest {
                return Err(fail(ValidationErrorKind::MissingArgument {
                    index: self.positional.len() + rest.len(),
                    expected: ty,
                }));
            }
        }

        if self.rest == Some(ArgumentType::FileSet) {
            if !rest.is_empty() {
                args.positional.push(gather_files(&rest).map_err(fail)?);
            }
        } else {
            for (atom, ty) in rest {
                args.positional.push(convert(atom, ty).map_err(fail)?);
            }
        }

        Ok(args)
    }
}

fn validate_pairs(
    atoms: &[Atom<'_>],
    ty: ArgumentType,
    limit: Option<usize>,
) -> Result<Args, ValidationErrorKind> {
    let mut args = Args::default();
    let mut i = 0;
    while i < atoms.len() {
        match atoms[i] {
            Atom::Word(key) => {
                let Some(&value) = atoms.get(i + 1) else {
                    return Err(ValidationErrorKind::MalformedPair(key.to_string()));
                };
                args.keywords.push((key.to_string(), vec![convert(value, ty)?]));
                i += 2;
            }
            Atom::Group(items) => {
                match self::atoms(items).as_slice() {
                    [Atom::Word(key), value] => {
                        args.keywords
                            .push(((*key).to_string(), vec![convert(*value, ty)?]));
                    }
                    _ => return Err(ValidationErrorKind::MalformedPair("(...)".to_string())),
                }
                i += 1;
            }
            other => return Err(ValidationErrorKind::MalformedPair(other.describe())),
        }
    }

    if args.keywords.is_empty() {
        return Err(ValidationErrorKind::MissingArgument {
            index: 0,
            expected: ty,
        });
    }
    if let Some(limit) = limit {
        if args.keywords.len() > limit {
            return Err(ValidationErrorKind::PairCount {
                limit,
                found: args.keywords.len(),
            });
        }
    }
    Ok(args)
}

fn convert(atom: Atom<'_>, ty: ArgumentType) -> Result<Arg, ValidationErrorKind> {
    Ok(match (atom, ty) {
        (Atom::Number(n), ArgumentType::Number | ArgumentType::Variable) => Arg::Number(n),
        (Atom::Number(n), ArgumentType::String) => Arg::Text(n.to_string()),
        (Atom::Number(n), ArgumentType::FileSet) => {
            Arg::Files(std::iter::once(n.to_string().as_str()).collect())
        }
        (Atom::Str(s), ArgumentType::Number) => {
            s.trim()
                .parse()
                .map(Arg::Number)
                .map_err(|_| ValidationErrorKind::WrongType {
                    argument: atom.describe(),
                    expected: ty,
                })?
        }
        (Atom::Str(s) | Atom::Word(s), ArgumentType::String) | (Atom::Str(s), ArgumentType::Variable) => {
            Arg::Text(s.to_string())
        }
        (Atom::Str(s) | Atom::Word(s), ArgumentType::FileSet) => {
            Arg::Files(std::iter::once(s).collect())
        }
        (Atom::Word(w), ArgumentType::Variable) => Arg::Variable(w.to_string()),
        (Atom::Word(w), ArgumentType::Number) => Arg::Lazy(Lazy {
            expr: Expr::Var(w.to_string()),
            ty,
        }),
        (Atom::Op(node), _) => Arg::Lazy(Lazy {
            expr: operator(node)?,
            ty,
        }),
        (Atom::Group(_), _) => {
            return Err(ValidationErrorKind::WrongType {
                argument: atom.describe(),
                expected: ty,
            });
        }
    })
}

/// Merge trailing file-set items into one argument.
fn gather_files(items: &[(Atom<'_>, ArgumentType)]) -> Result<Arg, ValidationErrorKind> {
    let mut exprs = Vec::with_capacity(items.len());
    let mut literal = FileSet::new();
    let mut all_literal = true;
    for &(atom, ty) in items {
        match convert(atom, ty)? {
            Arg::Files(files) => {
                literal.extend(&files);
                exprs.push(Expr::Literal(Scalar::Files(files)));
            }
            Arg::Lazy(lazy) => {
                all_literal = false;
                exprs.push(lazy.expr);
            }
            other => {
                return Err(ValidationErrorKind::WrongType {
                    argument: format!("{other:?}"),
                    expected: ArgumentType::FileSet,
                });
            }
        }
    }
    if all_literal {
        Ok(Arg::Files(literal))
    } else {
        Ok(Arg::Lazy(Lazy {
            expr: Expr::List(exprs),
            ty: ArgumentType::FileSet,
        }))
    }
}

/// Build an expression from an operator group `(op operands...)`.
fn operator(node: &SyntaxNode) -> Result<Expr, ValidationErrorKind> {
    let bad = |reason| ValidationErrorKind::BadOperator {
        op: node.name.clone(),
        reason,
    };
    let operands = ungroup(atoms(&node.arguments));
    match node.name.as_str() {
        "var" => match operands.as_slice() {
            [Atom::Word(name)] => Ok(Expr::Var((*name).to_string())),
            _ => Err(bad("takes exactly one name")),
        },
        "add" | "sub" => {
            let [left, right] = operands.as_slice() else {
                return Err(bad("takes exactly two operands"));
            };
            let op = if node.name == "add" {
                BinOp::Add
            } else {
                BinOp::Sub
            };
            Ok(Expr::Bin {
                op,
                left: Box::new(operand(*left)?),
                right: Box::new(operand(*right)?),
            })
        }
        _ => Err(bad("unknown operator")),
    }
}

fn operand(atom: Atom<'_>) -> Result<Expr, ValidationErrorKind> {
    match atom {
        Atom::Number(n) => Ok(Expr::Literal(Scalar::Number(n))),
        Atom::Str(s) => Ok(Expr::Literal(Scalar::Text(s.to_string()))),
        Atom::Word(w) => Ok(Expr::Var(w.to_string())),
        Atom::Op(node) => operator(node),
        Atom::Group(_) => Err(ValidationErrorKind::WrongType {
            argument: atom.describe(),
            expected: ArgumentType::Variable,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::parser::parse;

    struct Vars(HashMap<&'static str, Scalar>);

    impl Lookup for Vars {
        fn lookup(&self, name: &str) -> Option<Scalar> {
            self.0.get(name).cloned()
        }
    }

    fn first(src: &str) -> SyntaxNode {
        parse(src).expect("parse").remove(0)
    }

    const ECHO: Shape = Shape {
        rest: Some(ArgumentType::String),
        ..Shape::EMPTY
    };

    const TARGET: Shape = Shape {
        positional: &[ArgumentType::String],
        keys: Keys::Only(&[("depends", ArgumentType::String)]),
        allow_children: true,
        ..Shape::EMPTY
    };

    const SET: Shape = Shape {
        keys: Keys::Pairs {
            ty: ArgumentType::Variable,
            limit: None,
        },
        ..Shape::EMPTY
    };

    #[test]
    fn words_become_text() {
        let args = ECHO.validate(&first("echo hello (big) world 3")).expect("valid");
        let texts: Vec<_> = args.positional.iter().filter_map(Arg::as_text).collect();
        assert_eq!(texts, ["hello", "big", "world", "3"]);
    }

    #[test]
    fn keyword_arguments() {
        let args = TARGET
            .validate(&first("target build depends compile test"))
            .expect("valid");
        assert_eq!(args.positional, vec![Arg::Text("build".to_string())]);
        let deps: Vec<_> = args.keyword("depends").filter_map(Arg::as_text).collect();
        assert_eq!(deps, ["compile", "test"]);
    }

    #[test]
    fn missing_positional() {
        let err = TARGET.validate(&first("target")).unwrap_err();
        assert_eq!(err.node, "target");
        assert_eq!(
            err.kind,
            ValidationErrorKind::MissingArgument {
                index: 0,
                expected: ArgumentType::String
            }
        );
    }

    #[test]
    fn unexpected_argument() {
        let err = TARGET.validate(&first("target a b")).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::UnexpectedArgument("b".to_string())
        );
    }

    #[test]
    fn pairs_bare_and_grouped() {
        let args = SET.validate(&first("set x 1 y z")).expect("valid");
        assert_eq!(
            args.keywords,
            vec![
                ("x".to_string(), vec![Arg::Number(1)]),
                ("y".to_string(), vec![Arg::Variable("z".to_string())]),
            ]
        );
        let args = SET
            .validate(&first("set (a \"one\") (b (add a 1))"))
            .expect("valid");
        assert_eq!(args.keywords.len(), 2);
        assert!(matches!(args.keywords[1].1[0], Arg::Lazy(_)));
    }

    #[test]
    fn malformed_pair() {
        let err = SET.validate(&first("set x")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::MalformedPair("x".to_string()));
    }

    #[test]
    fn pair_limit() {
        let shape = Shape {
            keys: Keys::Pairs {
                ty: ArgumentType::Variable,
                limit: Some(1),
            },
            ..Shape::EMPTY
        };
        let err = shape.validate(&first("assign a 1 b 2")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::PairCount { limit: 1, found: 2 });
    }

    #[test]
    fn file_sets_merge_and_dedupe() {
        let shape = Shape {
            rest: Some(ArgumentType::FileSet),
            min_rest: 1,
            ..Shape::EMPTY
        };
        let args = shape.validate(&first("use common \"lib\" common")).expect("valid");
        assert_eq!(
            args.positional,
            vec![Arg::Files(["common", "lib"].into_iter().collect())]
        );
        assert!(shape.validate(&first("use")).is_err());
    }

    #[test]
    fn lazy_expressions_resolve() {
        let args = ECHO.validate(&first("echo (add n 2) (var who)")).expect("valid");
        let vars = Vars(HashMap::from([
            ("n", Scalar::Number(40)),
            ("who", Scalar::Text("me".to_string())),
        ]));
        let resolved: Vec<String> = args
            .positional
            .iter()
            .map(|a| a.resolve(&vars).expect("resolves").to_string())
            .collect();
        assert_eq!(resolved, ["42", "me"]);
    }

    #[test]
    fn unresolved_variable() {
        let arg = Arg::Variable("nope".to_string());
        let err = arg.resolve(&Vars(HashMap::new())).unwrap_err();
        assert_eq!(
            err,
            EvalError::UnresolvedName {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn bad_operator_arity() {
        let err = ECHO.validate(&first("echo (add 1)")).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::BadOperator { .. }));
    }

    #[test]
    fn add_concatenates_text() {
        let expr = Expr::Bin {
            op: BinOp::Add,
            left: Box::new(Expr::Literal(Scalar::Text("v".to_string()))),
            right: Box::new(Expr::Literal(Scalar::Number(2))),
        };
        let value = expr.eval(&Vars(HashMap::new())).expect("evaluates");
        assert_eq!(value, Scalar::Text("v2".to_string()));
    }

    #[test]
    fn sub_rejects_text() {
        let expr = Expr::Bin {
            op: BinOp::Sub,
            left: Box::new(Expr::Literal(Scalar::Number(1))),
            right: Box::new(Expr::Literal(Scalar::Text("x".to_string()))),
        };
        assert!(matches!(
            expr.eval(&Vars(HashMap::new())),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn coercion() {
        assert_eq!(
            Scalar::Text(" 7 ".to_string()).coerce(ArgumentType::Number),
            Ok(Scalar::Number(7))
        );
        assert_eq!(
            Scalar::Number(7).coerce(ArgumentType::String),
            Ok(Scalar::Text("7".to_string()))
        );
    }
}
