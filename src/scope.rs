//! Variable frames and the lookup chain used while executing.
//!
//! Lookup searches the pushed frames innermost first, then the
//! borrowed outer frames (namespace chain, then globals). Binding
//! always writes the innermost pushed frame.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use crate::types::{Lookup, Scalar};

/// One level of variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    vars: BTreeMap<String, Scalar>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: Scalar) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Scalar)> for Frame {
    fn from_iter<I: IntoIterator<Item = (K, Scalar)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Role of a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Namespace,
    /// `target` and `namespace` names of the running target.
    Superlocals,
    Locals,
}

/// Stack of owned frames over a chain of borrowed ones.
#[derive(Debug, Default)]
pub struct Scope<'a> {
    outer: Vec<&'a Frame>,
    frames: Vec<(FrameKind, Frame)>,
}

impl<'a> Scope<'a> {
    /// `outer` is ordered innermost first.
    #[must_use]
    pub const fn new(outer: Vec<&'a Frame>) -> Self {
        Self {
            outer,
            frames: Vec::new(),
        }
    }

    /// Push `frame`; it is popped when the guard drops.
    pub fn push(&mut self, kind: FrameKind, frame: Frame) -> ScopeGuard<'_, 'a> {
        let depth = self.frames.len();
        self.frames.push((kind, frame));
        ScopeGuard { scope: self, depth }
    }

    /// Bind in the innermost pushed frame, pushing a locals frame if
    /// there is none.
    pub fn bind(&mut self, name: &str, value: Scalar) {
        if self.frames.is_empty() {
            self.frames.push((FrameKind::Locals, Frame::new()));
        }
        if let Some((_, frame)) = self.frames.last_mut() {
            frame.set(name, value);
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn innermost(&self) -> Option<FrameKind> {
        self.frames.last().map(|(kind, _)| *kind)
    }
}

impl Lookup for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<Scalar> {
        self.frames
            .iter()
            .rev()
            .map(|(_, frame)| frame)
            .chain(self.outer.iter().copied())
            .find_map(|frame| frame.get(name))
            .cloned()
    }
}

/// Pops the frame it pushed on drop.
pub struct ScopeGuard<'s, 'a> {
    scope: &'s mut Scope<'a>,
    depth: usize,
}

impl ScopeGuard<'_, '_> {
    /// Pop the guarded frame and hand it back.
    #[must_use]
    pub fn finish(self) -> Frame {
        self.scope.frames.truncate(self.depth + 1);
        self.scope
            .frames
            .pop()
            .map(|(_, frame)| frame)
            .unwrap_or_default()
    }
}

impl<'a> Deref for ScopeGuard<'_, 'a> {
    type Target = Scope<'a>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for ScopeGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        self.scope.frames.truncate(self.depth);
    }
}
