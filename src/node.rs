//! The instantiated node tree.
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other by
//! [`NodeId`]. Ids grow in load order, which is also declaration
//! order. A namespace partitions its children into pre statements,
//! targets and post statements when its block closes.

use std::fmt;
use std::ops::Index;

use crate::command::{Command, CommandError};
use crate::token::Span;
use crate::types::{Arg, FileSet, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised while turning syntax nodes into tree nodes.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unknown node '{name}' at {span}")]
    UnknownNode { name: String, span: Span },
    #[error("'{name}' is an expression and cannot stand alone at {span}")]
    BareExpression { name: String, span: Span },
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("'{name}' does not take a child block at {span}")]
    ChildrenNotAllowed { name: String, span: Span },
    #[error("'{name}' is not allowed inside {parent} at {span}")]
    Misplaced {
        name: String,
        parent: String,
        span: Span,
    },
    #[error("'use' must come before any other node at {span}")]
    UseNotFirst { span: Span },
    #[error("'{name}' at {span} separates two groups of targets")]
    Partition { name: String, span: Span },
    #[error("duplicate target '{name}' at {span}")]
    DuplicateTarget { name: String, span: Span },
    #[error("configuring '{name}' failed: {source}")]
    Configure { name: String, source: CommandError },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    pub label: String,
    /// Set when this namespace is the root of a loaded file.
    pub file: Option<String>,
    pub pre: Vec<NodeId>,
    pub targets: Vec<NodeId>,
    pub post: Vec<NodeId>,
    /// Namespaces declared in this namespace's block.
    pub nested: Vec<NodeId>,
    /// Namespaces brought in by `use`, in import order.
    pub imports: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub depends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Set(Vec<(String, Arg)>),
    Assign((String, Arg)),
}

impl Statement {
    /// Bindings in source order.
    #[must_use]
    pub fn bindings(&self) -> &[(String, Arg)] {
        match self {
            Self::Set(pairs) => pairs,
            Self::Assign(pair) => std::slice::from_ref(pair),
        }
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Namespace(Namespace),
    Target(Target),
    Statement(Statement),
    Use(FileSet),
    Command(Box<dyn Command>),
}

#[derive(Debug)]
pub struct Node {
    /// Node type name as written in the script.
    pub name: String,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// Arena of nodes for one loaded script and everything it uses.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, parent: Option<NodeId>, name: &str, span: Span, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            span,
            parent,
            children: Vec::new(),
            kind,
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn namespace(&self, id: NodeId) -> Option<&Namespace> {
        match &self.get(id)?.kind {
            NodeKind::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    #[must_use]
    pub fn target(&self, id: NodeId) -> Option<&Target> {
        match &self.get(id)?.kind {
            NodeKind::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Set the children of `parent`. Namespaces partition them; a
    /// non-target node between two targets is an error.
    pub fn attach(&mut self, parent: NodeId, children: Vec<NodeId>) -> Result<(), BuildError> {
        if self.namespace(parent).is_some() {
            let layout = self.partition(&children)?;
            if let Some(NodeKind::Namespace(ns)) = self.nodes.get_mut(parent.0).map(|n| &mut n.kind) {
                ns.pre = layout.pre;
                ns.targets = layout.targets;
                ns.post = layout.post;
                ns.nested = layout.nested;
                ns.imports = layout.imports;
            }
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children = children;
        }
        Ok(())
    }

    fn partition(&self, children: &[NodeId]) -> Result<Layout, BuildError> {
        let mut layout = Layout::default();
        // Last non-target seen after the first target.
        let mut pending: Option<NodeId> = None;
        for &id in children {
            let node = &self[id];
            match &node.kind {
                NodeKind::Target(target) => {
                    if let Some(between) = pending {
                        let between = &self[between];
                        return Err(BuildError::Partition {
                            name: between.name.clone(),
                            span: between.span.clone(),
                        });
                    }
                    let duplicate = layout
                        .targets
                        .iter()
                        .any(|&t| self.target(t).is_some_and(|t| t.name == target.name));
                    if duplicate {
                        return Err(BuildError::DuplicateTarget {
                            name: target.name.clone(),
                            span: node.span.clone(),
                        });
                    }
                    layout.targets.push(id);
                }
                kind => {
                    if layout.targets.is_empty() {
                        layout.pre.push(id);
                    } else {
                        pending = Some(id);
                        layout.post.push(id);
                    }
                    match kind {
                        NodeKind::Namespace(_) => layout.nested.push(id),
                        NodeKind::Use(_) => layout.imports.extend(node.children.iter().copied()),
                        _ => {}
                    }
                }
            }
        }
        Ok(layout)
    }

    /// Attach `ns` as an extra import of the namespace `parent`.
    pub fn adopt(&mut self, parent: NodeId, ns: NodeId) {
        if let Some(node) = self.nodes.get_mut(ns.0) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(ns);
            if let NodeKind::Namespace(namespace) = &mut node.kind {
                namespace.imports.push(ns);
            }
        }
    }

    /// Innermost namespace containing `id`, or `id` itself if it is one.
    #[must_use]
    pub fn owning_namespace(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(at) = current {
            if self.namespace(at).is_some() {
                return Some(at);
            }
            current = self.get(at)?.parent;
        }
        None
    }

    /// Enclosing namespace of a nested namespace block. File roots and
    /// the script root have none.
    #[must_use]
    pub fn lexical_parent(&self, ns: NodeId) -> Option<NodeId> {
        if self.namespace(ns)?.file.is_some() {
            return None;
        }
        let parent = self.get(ns)?.parent?;
        self.namespace(parent).map(|_| parent)
    }

    /// `ns` followed by its lexical ancestors.
    pub fn namespace_chain(&self, ns: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(ns), |&at| self.lexical_parent(at))
    }

    /// Find a target by name relative to `ns`.
    ///
    /// A plain name searches `ns` and then, depth first, the namespaces
    /// it imports. A dotted name walks namespace labels first.
    #[must_use]
    pub fn find_target(&self, ns: NodeId, name: &str) -> Option<NodeId> {
        let namespace = self.namespace(ns)?;
        if let Some((head, rest)) = name.split_once('.') {
            let child = namespace
                .nested
                .iter()
                .chain(&namespace.imports)
                .copied()
                .find(|&c| self.namespace(c).is_some_and(|c| c.label == head))?;
            return self.find_target(child, rest);
        }
        namespace
            .targets
            .iter()
            .copied()
            .find(|&t| self.target(t).is_some_and(|t| t.name == name))
            .or_else(|| {
                namespace
                    .imports
                    .iter()
                    .find_map(|&i| self.find_target(i, name))
            })
    }

    /// Target name qualified by the labels of nested namespaces below
    /// its file root.
    #[must_use]
    pub fn target_path(&self, target: NodeId) -> String {
        let Some(name) = self.target(target).map(|t| t.name.as_str()) else {
            return target.to_string();
        };
        let mut labels: Vec<&str> = self
            .owning_namespace(target)
            .into_iter()
            .flat_map(|ns| self.namespace_chain(ns))
            .filter_map(|ns| self.namespace(ns))
            .filter(|ns| ns.file.is_none())
            .map(|ns| ns.label.as_str())
            .collect();
        labels.reverse();
        labels.push(name);
        labels.join(".")
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

#[derive(Default)]
struct Layout {
    pre: Vec<NodeId>,
    targets: Vec<NodeId>,
    post: Vec<NodeId>,
    nested: Vec<NodeId>,
    imports: Vec<NodeId>,
}
