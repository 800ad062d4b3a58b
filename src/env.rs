//! Loading scripts into node trees and running their targets.
//!
//! An [`Environment`] owns everything that outlives a single script:
//! the node type registry, the configuration store, global variables,
//! the source loader and the output sink. Loading produces a
//! [`Script`]; running a target plans the dependency graph first and
//! only then executes anything.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::ast::SyntaxNode;
use crate::command::{CommandError, Output, RunContext, Stdout};
use crate::config::ConfigStore;
use crate::graph::{ResolveError, TargetGraph};
use crate::lexer::{DEFAULT_TAB_WIDTH, LexOptions, Lexer};
use crate::loader::{FsLoader, SourceLoader, label_for};
use crate::node::{BuildError, Namespace, NodeId, NodeKind, Statement, Target, Tree};
use crate::parser::{Event, Parser, SyntaxError};
use crate::registry::{Builtin, Capability, NodeType, Registry};
use crate::scope::{Frame, FrameKind, Scope};
use crate::token::Span;
use crate::types::{Arg, Args, EvalError, FileSet, Scalar, ValidationError, ValidationErrorKind};

/// Failure to load a script or one of the files it uses.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read '{file}': {source}")]
    Read {
        file: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error("import cycle: {}", .chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },
}

/// Failure while running targets.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("{source} in {} at {span}", .target.as_deref().unwrap_or("namespace step"))]
    Eval {
        target: Option<String>,
        span: Span,
        source: EvalError,
    },
    #[error("'{node}' failed in {} at {span}: {source}", .target.as_deref().unwrap_or("namespace step"))]
    Command {
        target: Option<String>,
        node: String,
        span: Span,
        source: CommandError,
    },
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A loaded script: its node tree and root namespace.
#[derive(Debug)]
pub struct Script {
    tree: Tree,
    root: NodeId,
    name: String,
}

impl Script {
    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a target name as given on the command line.
    #[must_use]
    pub fn find_target(&self, name: &str) -> Option<NodeId> {
        self.tree.find_target(self.root, name)
    }

    /// Names of the targets declared directly in the root namespace.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        self.tree
            .namespace(self.root)
            .map(|ns| {
                ns.targets
                    .iter()
                    .filter_map(|&t| self.tree.target(t))
                    .map(|t| t.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct Environment {
    registry: Registry,
    config: ConfigStore,
    loader: Box<dyn SourceLoader>,
    output: Arc<dyn Output>,
    globals: Frame,
    tab_width: usize,
}

/// Children collected for one open block while loading.
struct Block {
    owner: NodeId,
    children: Vec<NodeId>,
}

impl Environment {
    /// Environment reading from the current directory and printing to
    /// standard output.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            config: ConfigStore::new(),
            loader: Box::new(FsLoader::default()),
            output: Arc::new(Stdout),
            globals: Frame::new(),
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn Output>) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ConfigStore) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width;
        self
    }

    /// Bind a global variable, visible to every namespace and target.
    pub fn define(&mut self, name: &str, value: Scalar) {
        self.globals.set(name, value);
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Give back the configuration store so the caller can persist it.
    #[must_use]
    pub fn into_config(self) -> ConfigStore {
        self.config
    }

    /// Read `name` through the loader and load it.
    pub fn load(&mut self, name: &str) -> Result<Script, LoadError> {
        let source = self.read(name)?;
        self.load_str(name, &source)
    }

    /// Load `source` as a script called `name`. Files it uses are read
    /// through the loader.
    pub fn load_str(&mut self, name: &str, source: &str) -> Result<Script, LoadError> {
        let mut tree = Tree::new();
        let root = tree.add(
            None,
            Builtin::Namespace.name(),
            Span::new(1, 1).in_file(Some(name)),
            NodeKind::Namespace(Namespace {
                label: label_for(name),
                file: Some(name.to_string()),
                ..Namespace::default()
            }),
        );
        let mut stack = vec![name.to_string()];
        self.build(&mut tree, root, name, source, &mut stack)?;
        info!(file = name, nodes = tree.len(), "script loaded");
        Ok(Script {
            tree,
            root,
            name: name.to_string(),
        })
    }

    fn read(&self, file: &str) -> Result<String, LoadError> {
        self.loader.read(file).map_err(|source| LoadError::Read {
            file: file.to_string(),
            source,
        })
    }

    /// Parse `source` and hang its nodes under the namespace `ns`.
    fn build(
        &mut self,
        tree: &mut Tree,
        ns: NodeId,
        file: &str,
        source: &str,
        stack: &mut Vec<String>,
    ) -> Result<(), LoadError> {
        let options = LexOptions {
            tab_width: self.tab_width,
            file: Some(file.to_string()),
        };
        let lexer = Lexer::with_options(source, options).map_err(SyntaxError::from)?;

        let mut blocks = vec![Block {
            owner: ns,
            children: Vec::new(),
        }];
        let mut last = ns;
        for event in Parser::new(lexer) {
            match event? {
                Event::Node { node, has_children } => {
                    let Some(block) = blocks.last_mut() else {
                        break;
                    };
                    let id = self.instantiate(
                        tree,
                        block.owner,
                        &block.children,
                        &node,
                        has_children,
                        stack,
                    )?;
                    block.children.push(id);
                    last = id;
                }
                Event::Enter => blocks.push(Block {
                    owner: last,
                    children: Vec::new(),
                }),
                Event::Exit => {
                    if let Some(block) = blocks.pop() {
                        tree.attach(block.owner, block.children)?;
                    }
                }
            }
        }
        while let Some(block) = blocks.pop() {
            tree.attach(block.owner, block.children)?;
        }
        Ok(())
    }

    fn instantiate(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        siblings: &[NodeId],
        node: &SyntaxNode,
        has_children: bool,
        stack: &mut Vec<String>,
    ) -> Result<NodeId, LoadError> {
        let ty = match self.registry.get(&node.name) {
            Some(ty) => ty.clone(),
            None if self.registry.capability(&node.name) == Some(Capability::Expression) => {
                return Err(BuildError::BareExpression {
                    name: node.name.clone(),
                    span: node.span.clone(),
                }
                .into());
            }
            None => {
                return Err(BuildError::UnknownNode {
                    name: node.name.clone(),
                    span: node.span.clone(),
                }
                .into());
            }
        };
        let shape = ty.shape();
        if has_children && !shape.allow_children {
            return Err(BuildError::ChildrenNotAllowed {
                name: node.name.clone(),
                span: node.span.clone(),
            }
            .into());
        }
        check_placement(tree, parent, siblings, &ty, node)?;

        let invalid = |kind| {
            BuildError::Validation(ValidationError {
                node: node.name.clone(),
                kind,
                span: node.span.clone(),
            })
        };
        let args = shape.validate(node).map_err(BuildError::from)?;

        let kind = match &ty {
            NodeType::Builtin(Builtin::Namespace) => NodeKind::Namespace(Namespace {
                label: first_literal(&args).map_err(invalid)?,
                ..Namespace::default()
            }),
            NodeType::Builtin(Builtin::Target) => NodeKind::Target(Target {
                name: first_literal(&args).map_err(invalid)?,
                depends: args
                    .keyword("depends")
                    .map(literal)
                    .collect::<Result<_, _>>()
                    .map_err(invalid)?,
            }),
            NodeType::Builtin(Builtin::Set) => NodeKind::Statement(Statement::Set(pairs(args))),
            NodeType::Builtin(Builtin::Assign) => {
                let pair = pairs(args)
                    .into_iter()
                    .next()
                    .ok_or_else(|| invalid(ValidationErrorKind::PairCount { limit: 1, found: 0 }))?;
                NodeKind::Statement(Statement::Assign(pair))
            }
            NodeType::Builtin(Builtin::Use) => {
                let files = match args.positional.first() {
                    Some(Arg::Files(files)) => files.clone(),
                    _ => return Err(invalid(ValidationErrorKind::NotLiteral("use".to_string())).into()),
                };
                return self.import_all(tree, parent, node, files, stack);
            }
            NodeType::Command(command_type) => {
                self.config
                    .configure(&node.name, command_type.as_ref())
                    .map_err(|source| BuildError::Configure {
                        name: node.name.clone(),
                        source,
                    })?;
                NodeKind::Command(command_type.build(args).map_err(invalid)?)
            }
        };
        Ok(tree.add(Some(parent), &node.name, node.span.clone(), kind))
    }

    /// Load `file` as a namespace under `parent`, which must be a
    /// namespace of `script`. The new namespace becomes one of
    /// `parent`'s imports, so its targets resolve from there.
    pub fn load_file(&mut self, script: &mut Script, parent: NodeId, file: &str) -> Result<NodeId, LoadError> {
        let mut stack = vec![script.name.clone()];
        let ns = self.load_namespace(&mut script.tree, parent, file, &mut stack)?;
        script.tree.adopt(parent, ns);
        info!(file, "file attached");
        Ok(ns)
    }

    /// Add a `use` node and load each of its files as a namespace
    /// beneath it.
    fn import_all(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        node: &SyntaxNode,
        files: FileSet,
        stack: &mut Vec<String>,
    ) -> Result<NodeId, LoadError> {
        let use_id = tree.add(
            Some(parent),
            &node.name,
            node.span.clone(),
            NodeKind::Use(files.clone()),
        );
        let imported = files
            .iter()
            .map(|file| self.load_namespace(tree, use_id, file, stack))
            .collect::<Result<Vec<_>, _>>()?;
        tree.attach(use_id, imported)?;
        Ok(use_id)
    }

    /// Read `file` and build it into a new file-root namespace under
    /// `parent`. `stack` holds the files currently being loaded.
    fn load_namespace(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        file: &str,
        stack: &mut Vec<String>,
    ) -> Result<NodeId, LoadError> {
        if stack.iter().any(|open| open == file) {
            let mut chain = stack.clone();
            chain.push(file.to_string());
            return Err(LoadError::ImportCycle { chain });
        }
        let source = self.read(file)?;
        let ns = tree.add(
            Some(parent),
            Builtin::Namespace.name(),
            Span::new(1, 1).in_file(Some(file)),
            NodeKind::Namespace(Namespace {
                label: label_for(file),
                file: Some(file.to_string()),
                ..Namespace::default()
            }),
        );
        stack.push(file.to_string());
        self.build(tree, ns, file, &source, stack)?;
        stack.pop();
        debug!(file, "imported");
        Ok(ns)
    }

    /// Run one target and everything it depends on.
    pub fn run(&self, script: &Script, target: &str) -> Result<(), RunError> {
        self.run_all(script, &[target])
    }

    /// Run several targets in one session. A target shared between them
    /// runs once.
    pub fn run_all(&self, script: &Script, targets: &[&str]) -> Result<(), RunError> {
        let (requested, graph) = self.plan(script, targets)?;
        let tree = &script.tree;
        let mut run = Run::new(self, tree);
        for &target in &requested {
            run.enter_owner(target)?;
        }
        for target in graph.order() {
            run.enter_owner(target)?;
            run_target(self, tree, &run.frames, target)?;
        }
        run.finish()
    }

    /// Like [`run_all`](Self::run_all), but independent targets run on
    /// a pool of `jobs` threads (0 picks one per CPU).
    ///
    /// Namespace pre and post steps still run on the calling thread.
    /// After a failure no further targets start; the first error is
    /// returned.
    pub fn run_parallel(&self, script: &Script, targets: &[&str], jobs: usize) -> Result<(), RunError> {
        let (requested, graph) = self.plan(script, targets)?;
        let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
        let tree = &script.tree;
        let waves = graph.waves();

        let mut run = Run::new(self, tree);
        for &target in requested.iter().chain(waves.iter().flatten()) {
            run.enter_owner(target)?;
        }

        info!(waves = waves.len(), jobs, "running targets in parallel");
        let halted = AtomicBool::new(false);
        for wave in &waves {
            let frames = &run.frames;
            let failures: Vec<RunError> = pool.install(|| {
                wave.par_iter()
                    .filter_map(|&target| {
                        if halted.load(Ordering::SeqCst) {
                            return None;
                        }
                        let result = run_target(self, tree, frames, target);
                        if result.is_err() {
                            halted.store(true, Ordering::SeqCst);
                        }
                        result.err()
                    })
                    .collect()
            });
            if let Some(error) = failures.into_iter().next() {
                warn!(%error, "stopping after failed target");
                return Err(error);
            }
        }
        run.finish()
    }

    fn plan(&self, script: &Script, targets: &[&str]) -> Result<(Vec<NodeId>, TargetGraph), RunError> {
        let requested = targets
            .iter()
            .map(|&name| {
                script
                    .find_target(name)
                    .ok_or_else(|| ResolveError::UnknownTarget {
                        name: name.to_string(),
                        referenced_by: None,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let graph = TargetGraph::build(&script.tree, &requested)?;
        debug!(requested = requested.len(), planned = graph.len(), "run planned");
        Ok((requested, graph))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

fn check_placement(
    tree: &Tree,
    parent: NodeId,
    siblings: &[NodeId],
    ty: &NodeType,
    node: &SyntaxNode,
) -> Result<(), BuildError> {
    let owner = &tree[parent];
    let in_namespace = matches!(owner.kind, NodeKind::Namespace(_));
    let allowed = match ty {
        NodeType::Builtin(Builtin::Namespace | Builtin::Target | Builtin::Use) => in_namespace,
        _ => true,
    };
    if !allowed {
        return Err(BuildError::Misplaced {
            name: node.name.clone(),
            parent: owner.name.clone(),
            span: node.span.clone(),
        });
    }
    if matches!(ty, NodeType::Builtin(Builtin::Use))
        && siblings
            .iter()
            .any(|&s| !matches!(tree[s].kind, NodeKind::Use(_)))
    {
        return Err(BuildError::UseNotFirst {
            span: node.span.clone(),
        });
    }
    Ok(())
}

fn literal(arg: &Arg) -> Result<String, ValidationErrorKind> {
    arg.as_text()
        .map(str::to_string)
        .ok_or_else(|| ValidationErrorKind::NotLiteral(format!("{arg:?}")))
}

fn first_literal(args: &Args) -> Result<String, ValidationErrorKind> {
    args.positional
        .first()
        .ok_or(ValidationErrorKind::MissingArgument {
            index: 0,
            expected: crate::types::ArgumentType::String,
        })
        .and_then(literal)
}

fn pairs(args: Args) -> Vec<(String, Arg)> {
    args.keywords
        .into_iter()
        .filter_map(|(key, mut values)| values.pop().map(|value| (key, value)))
        .collect()
}

/// Per-run namespace state for the sequential parts of a run.
struct Run<'e> {
    env: &'e Environment,
    tree: &'e Tree,
    frames: BTreeMap<NodeId, Frame>,
    /// Namespaces in the order their pre steps ran.
    entered: Vec<NodeId>,
}

impl<'e> Run<'e> {
    const fn new(env: &'e Environment, tree: &'e Tree) -> Self {
        Self {
            env,
            tree,
            frames: BTreeMap::new(),
            entered: Vec::new(),
        }
    }

    fn enter_owner(&mut self, target: NodeId) -> Result<(), RunError> {
        match self.tree.owning_namespace(target) {
            Some(ns) => self.enter(ns),
            None => Ok(()),
        }
    }

    /// Run the pre steps of `ns`, after those of its enclosing
    /// namespaces, the first time it is needed.
    fn enter(&mut self, ns: NodeId) -> Result<(), RunError> {
        if self.frames.contains_key(&ns) {
            return Ok(());
        }
        let tree = self.tree;
        if let Some(parent) = tree.lexical_parent(ns) {
            self.enter(parent)?;
        }
        let Some(namespace) = tree.namespace(ns) else {
            return Ok(());
        };
        debug!(namespace = %namespace.label, "entering namespace");
        let frame = self.steps(ns, &namespace.pre, Frame::new())?;
        self.frames.insert(ns, frame);
        self.entered.push(ns);
        Ok(())
    }

    fn steps(&self, ns: NodeId, steps: &[NodeId], frame: Frame) -> Result<Frame, RunError> {
        let outer = outer_frames(self.env, self.tree, &self.frames, self.tree.lexical_parent(ns));
        let mut scope = Scope::new(outer);
        let mut guard = scope.push(FrameKind::Namespace, frame);
        for &step in steps {
            execute(self.env, self.tree, step, &mut guard, None)?;
        }
        Ok(guard.finish())
    }

    /// Run post steps, most recently entered namespace first.
    fn finish(mut self) -> Result<(), RunError> {
        let tree = self.tree;
        while let Some(ns) = self.entered.pop() {
            let Some(namespace) = tree.namespace(ns) else {
                continue;
            };
            if namespace.post.is_empty() {
                continue;
            }
            debug!(namespace = %namespace.label, "leaving namespace");
            let frame = self.frames.remove(&ns).unwrap_or_default();
            let frame = self.steps(ns, &namespace.post, frame)?;
            self.frames.insert(ns, frame);
        }
        info!(namespaces = self.frames.len(), "run complete");
        Ok(())
    }
}

/// Frames visible from inside `start`: its chain of namespaces, then
/// globals.
fn outer_frames<'a>(
    env: &'a Environment,
    tree: &Tree,
    frames: &'a BTreeMap<NodeId, Frame>,
    start: Option<NodeId>,
) -> Vec<&'a Frame> {
    start
        .into_iter()
        .flat_map(|ns| tree.namespace_chain(ns))
        .filter_map(|ns| frames.get(&ns))
        .chain(std::iter::once(&env.globals))
        .collect()
}

/// Execute one target's body in fresh superlocal and local frames.
fn run_target(
    env: &Environment,
    tree: &Tree,
    frames: &BTreeMap<NodeId, Frame>,
    target: NodeId,
) -> Result<(), RunError> {
    let Some(def) = tree.target(target) else {
        return Ok(());
    };
    let path = tree.target_path(target);
    let _span = info_span!("target", name = %path).entered();

    let ns = tree.owning_namespace(target);
    let label = ns
        .and_then(|ns| tree.namespace(ns))
        .map(|ns| ns.label.clone())
        .unwrap_or_default();
    let mut scope = Scope::new(outer_frames(env, tree, frames, ns));
    let mut supers = scope.push(
        FrameKind::Superlocals,
        [
            ("target", Scalar::Text(def.name.clone())),
            ("namespace", Scalar::Text(label)),
        ]
        .into_iter()
        .collect(),
    );
    let mut locals = supers.push(FrameKind::Locals, Frame::new());

    info!("running target");
    for &step in &tree[target].children {
        execute(env, tree, step, &mut locals, Some(&path))?;
    }
    Ok(())
}

fn execute(
    env: &Environment,
    tree: &Tree,
    id: NodeId,
    scope: &mut Scope<'_>,
    target: Option<&str>,
) -> Result<(), RunError> {
    let node = &tree[id];
    let eval_error = |source| RunError::Eval {
        target: target.map(str::to_string),
        span: node.span.clone(),
        source,
    };
    match &node.kind {
        NodeKind::Statement(statement) => {
            for (name, arg) in statement.bindings() {
                let value = arg.resolve(&*scope).map_err(eval_error)?;
                debug!(%name, %value, "bind");
                scope.bind(name, value);
            }
        }
        NodeKind::Command(command) => {
            let mut ctx = RunContext {
                scope,
                output: env.output.as_ref(),
                target,
                span: &node.span,
            };
            command.run(&mut ctx).map_err(|error| match error {
                CommandError::Eval(source) => eval_error(source),
                source => RunError::Command {
                    target: target.map(str::to_string),
                    node: node.name.clone(),
                    span: node.span.clone(),
                    source,
                },
            })?;
        }
        NodeKind::Namespace(_) | NodeKind::Target(_) | NodeKind::Use(_) => {}
    }
    Ok(())
}
