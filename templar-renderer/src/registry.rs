//! Template function registry.
//!
//! Functions are contributed by [`FunctionSource`]s. A source is asked for its
//! functions every time a template is rendered, and is handed the
//! [`MaterialSink`] of *that* render, so a function can only ever record
//! materials into the ledger of the render that called it. Anything a source
//! wants to keep between renders (release lookups, package indexes) lives in
//! the source itself.
//!
//! Every function declares its [`ResultKind`] up front. The dry-run engine
//! uses that tag to pick a stub returning a value of the right shape.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tera::Value;

/// Named arguments of a template function call.
pub type Args = HashMap<String, Value>;

type Body = dyn Fn(&Args) -> tera::Result<Value> + Send + Sync;
type Stub = dyn Fn(&Args) -> Value + Send + Sync;

// ---------------------------------------------------------------------------
// Result kinds
// ---------------------------------------------------------------------------

/// Shape of the value a template function returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Text,
    List,
    Map,
    Int,
}

impl ResultKind {
    /// The value a dry-run stub returns for this kind.
    pub fn zero_value(&self) -> Value {
        match self {
            ResultKind::Text => Value::String(String::new()),
            ResultKind::List => Value::Array(Vec::new()),
            ResultKind::Map => Value::Object(serde_json::Map::new()),
            ResultKind::Int => Value::from(0),
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Text => write!(f, "text"),
            ResultKind::List => write!(f, "list"),
            ResultKind::Map => write!(f, "map"),
            ResultKind::Int => write!(f, "int"),
        }
    }
}

// ---------------------------------------------------------------------------
// Material sink
// ---------------------------------------------------------------------------

/// Write access to the ledger of the render currently executing.
pub trait MaterialSink: Send + Sync {
    fn record(&self, material: &str, version: &str);
}

/// Sink that discards everything; used when only names and kinds are needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MaterialSink for NullSink {
    fn record(&self, _material: &str, _version: &str) {}
}

// ---------------------------------------------------------------------------
// Functions and sources
// ---------------------------------------------------------------------------

/// A callable reachable from template text.
#[derive(Clone)]
pub struct TemplateFunction {
    name: String,
    kind: ResultKind,
    body: Arc<Body>,
    stub: Option<Arc<Stub>>,
}

impl TemplateFunction {
    pub fn new<F>(name: impl Into<String>, kind: ResultKind, body: F) -> Self
    where
        F: Fn(&Args) -> tera::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            body: Arc::new(body),
            stub: None,
        }
    }

    /// Replace the dry-run value for this function. The stub sees the call's
    /// arguments and must not contact anything upstream.
    ///
    /// Useful when templates index into a [`ResultKind::Map`] result by key.
    pub fn with_stub<S>(mut self, stub: S) -> Self
    where
        S: Fn(&Args) -> Value + Send + Sync + 'static,
    {
        self.stub = Some(Arc::new(stub));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn call(&self, args: &Args) -> tera::Result<Value> {
        (self.body)(args)
    }

    /// The value a dry run returns for this call.
    pub fn stub_value(&self, args: &Args) -> Value {
        match &self.stub {
            Some(stub) => stub(args),
            None => self.kind.zero_value(),
        }
    }
}

impl fmt::Debug for TemplateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateFunction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("stubbed", &self.stub.is_some())
            .finish_non_exhaustive()
    }
}

/// Supplies a group of template functions bound to a material sink.
pub trait FunctionSource: Send + Sync {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction>;
}

impl<F> FunctionSource for F
where
    F: Fn(Arc<dyn MaterialSink>) -> Vec<TemplateFunction> + Send + Sync,
{
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        self(sink)
    }
}

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

/// Ordered collection of function sources.
///
/// When two sources provide a function with the same name, the source
/// registered later wins.
#[derive(Default)]
pub struct FunctionRegistry {
    sources: Vec<Box<dyn FunctionSource>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source. Registration order decides name collisions.
    pub fn register(&mut self, source: impl FunctionSource + 'static) -> &mut Self {
        for function in source.functions(Arc::new(NullSink)) {
            tracing::debug!(name = function.name(), kind = %function.kind(), "registered template function");
        }
        self.sources.push(Box::new(source));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, source: impl FunctionSource + 'static) -> Self {
        self.register(source);
        self
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Ask every source for its functions, bound to `sink`.
    pub fn bind(&self, sink: Arc<dyn MaterialSink>) -> BTreeMap<String, TemplateFunction> {
        let mut bound = BTreeMap::new();
        for source in &self.sources {
            for function in source.functions(Arc::clone(&sink)) {
                bound.insert(function.name().to_string(), function);
            }
        }
        bound
    }

    /// Name and declared kind of every function a render would see.
    pub fn signatures(&self) -> BTreeMap<String, ResultKind> {
        self.bind(Arc::new(NullSink))
            .into_iter()
            .map(|(name, function)| (name, function.kind()))
            .collect()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.signatures())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
