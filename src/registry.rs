//! Maps node names to the types that build them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandType, EchoType};
use crate::types::{ArgumentType, Keys, OPERATORS, Shape};

/// Node types the loader builds itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Namespace,
    Target,
    Set,
    Assign,
    Use,
}

impl Builtin {
    pub const ALL: [Self; 5] = [
        Self::Namespace,
        Self::Target,
        Self::Set,
        Self::Assign,
        Self::Use,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Target => "target",
            Self::Set => "set",
            Self::Assign => "assign",
            Self::Use => "use",
        }
    }

    #[must_use]
    pub const fn shape(self) -> Shape {
        match self {
            Self::Namespace => Shape {
                positional: &[ArgumentType::String],
                allow_children: true,
                ..Shape::EMPTY
            },
            Self::Target => Shape {
                positional: &[ArgumentType::String],
                keys: Keys::Only(&[("depends", ArgumentType::String)]),
                allow_children: true,
                ..Shape::EMPTY
            },
            Self::Set => Shape {
                keys: Keys::Pairs {
                    ty: ArgumentType::Variable,
                    limit: None,
                },
                ..Shape::EMPTY
            },
            Self::Assign => Shape {
                keys: Keys::Pairs {
                    ty: ArgumentType::Variable,
                    limit: Some(1),
                },
                ..Shape::EMPTY
            },
            Self::Use => Shape {
                rest: Some(ArgumentType::FileSet),
                min_rest: 1,
                ..Shape::EMPTY
            },
        }
    }

    #[must_use]
    pub const fn capability(self) -> Capability {
        match self {
            Self::Namespace | Self::Target | Self::Use => Capability::Container,
            Self::Set | Self::Assign => Capability::Statement,
        }
    }
}

/// What a node does when it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Binds variables.
    Statement,
    /// Computes a value in argument position.
    Expression,
    /// Runs an action.
    Command,
    /// Holds child nodes.
    Container,
}

#[derive(Clone)]
pub enum NodeType {
    Builtin(Builtin),
    Command(Arc<dyn CommandType>),
}

impl NodeType {
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Self::Builtin(builtin) => builtin.shape(),
            Self::Command(ty) => ty.shape(),
        }
    }

    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Builtin(builtin) => builtin.capability(),
            Self::Command(_) => Capability::Command,
        }
    }
}

/// Node types known to a loader.
///
/// [`Registry::new`] knows only the builtins; the [`Default`] registry
/// adds `echo`.
#[derive(Clone)]
pub struct Registry {
    types: BTreeMap<String, NodeType>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        let types = Builtin::ALL
            .into_iter()
            .map(|b| (b.name().to_string(), NodeType::Builtin(b)))
            .collect();
        Self { types }
    }

    /// Register a command type, replacing any command of the same name.
    /// Builtin names cannot be replaced; returns `false` for them.
    pub fn register(&mut self, name: &str, ty: impl CommandType + 'static) -> bool {
        if matches!(self.types.get(name), Some(NodeType::Builtin(_))) {
            return false;
        }
        self.types
            .insert(name.to_string(), NodeType::Command(Arc::new(ty)));
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(name)
    }

    /// Capability of `name`, counting the argument operators as
    /// expressions.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<Capability> {
        if OPERATORS.contains(&name) {
            return Some(Capability::Expression);
        }
        self.get(name).map(NodeType::capability)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("echo", EchoType);
        registry
    }
}
