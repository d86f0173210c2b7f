//! Tera execution engine with two modes.
//!
//! - [`TemplateEngine::render`] binds every registered function for real and
//!   returns the output together with the ledger gathered during that one
//!   execution.
//! - [`TemplateEngine::dry_run`] binds every function name to a stub that
//!   records the call's arguments and returns the function's stub value (the
//!   zero value of its declared [`ResultKind`](crate::ResultKind) unless the function supplies
//!   its own). Nothing upstream is contacted and no ledger is written.
//!
//! Both modes parse the target template together with the shared include
//! templates loaded at construction.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tera::{Context, Tera, Value};

use templar_core::materials::Ledger;

use crate::error::{execute_err, io_err, parse_err, RenderError};
use crate::registry::{FunctionRegistry, MaterialSink, NullSink};

// ---------------------------------------------------------------------------
// Include loading
// ---------------------------------------------------------------------------

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Every `.tera` file below `dir`, named by its lowercased relative path.
fn load_includes(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        tracing::warn!(path = %dir.display(), "include directory does not exist");
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    files.sort();

    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        tracing::debug!(name = %name, "loaded include template");
        templates.push((name, contents));
    }
    Ok(templates)
}

// ---------------------------------------------------------------------------
// Render outputs
// ---------------------------------------------------------------------------

/// Output of a real render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    /// Materials recorded while this render executed, and only those.
    pub ledger: Ledger,
}

/// Arguments of one recorded call, by name.
pub type CallArgs = BTreeMap<String, Value>;

/// Every function call observed during a dry run, grouped by function name
/// and kept in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedCalls {
    calls: BTreeMap<String, Vec<CallArgs>>,
}

impl RecordedCalls {
    /// Calls made to `function`, in order. Empty if it was never called.
    pub fn calls(&self, function: &str) -> &[CallArgs] {
        self.calls.get(function).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The string value of argument `key` for every call to `function` that
    /// passed one.
    pub fn string_args(&self, function: &str, key: &str) -> Vec<String> {
        self.calls(function)
            .iter()
            .filter_map(|call| call.get(key).and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Names of all functions that were called at least once.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Ledger sink
// ---------------------------------------------------------------------------

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sink owned by exactly one render call.
#[derive(Default)]
struct LedgerSink {
    ledger: Mutex<Ledger>,
}

impl LedgerSink {
    fn take(&self) -> Ledger {
        std::mem::take(&mut *lock(&self.ledger))
    }
}

impl MaterialSink for LedgerSink {
    fn record(&self, material: &str, version: &str) {
        tracing::debug!(material, version, "gathered material");
        lock(&self.ledger).insert(material.to_string(), version.to_string());
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Renders project templates using the functions of a [`FunctionRegistry`].
///
/// The engine holds no per-render state; `render` and `dry_run` may be called
/// any number of times, in any order.
pub struct TemplateEngine {
    registry: FunctionRegistry,
    includes: Vec<(String, String)>,
}

impl TemplateEngine {
    /// Construct an engine, loading shared include templates from `include_dir`.
    pub fn new(registry: FunctionRegistry, include_dir: Option<&Path>) -> Result<Self, RenderError> {
        let includes = match include_dir {
            Some(dir) => load_includes(dir)?,
            None => Vec::new(),
        };
        Ok(TemplateEngine { registry, includes })
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Names of the loaded include templates.
    pub fn include_names(&self) -> Vec<&str> {
        self.includes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Execute the template at `path` with live functions.
    pub fn render(&self, path: &Path) -> Result<Rendered, RenderError> {
        tracing::debug!(path = %path.display(), "executing template");
        let sink = Arc::new(LedgerSink::default());

        let mut tera = new_tera();
        for (name, function) in self.registry.bind(sink.clone()) {
            tera.register_function(&name, move |args: &HashMap<String, Value>| function.call(args));
        }

        let name = self.parse_into(&mut tera, path)?;
        let content = tera
            .render(&name, &Context::new())
            .map_err(|e| execute_err(path, e))?;

        Ok(Rendered {
            content,
            ledger: sink.take(),
        })
    }

    /// Execute the template at `path` with every function stubbed out.
    pub fn dry_run(&self, path: &Path) -> Result<RecordedCalls, RenderError> {
        tracing::debug!(path = %path.display(), "dry run of template");
        let recorded: Arc<Mutex<BTreeMap<String, Vec<CallArgs>>>> = Arc::default();

        let mut tera = new_tera();
        for (name, function) in self.registry.bind(Arc::new(NullSink)) {
            let recorded = Arc::clone(&recorded);
            let key = name.clone();
            tera.register_function(&name, move |args: &HashMap<String, Value>| {
                let call: CallArgs = args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                lock(&recorded).entry(key.clone()).or_default().push(call);
                Ok(function.stub_value(args))
            });
        }

        let name = self.parse_into(&mut tera, path)?;
        tera.render(&name, &Context::new())
            .map_err(|e| execute_err(path, e))?;

        let calls = std::mem::take(&mut *lock(&recorded));
        Ok(RecordedCalls { calls })
    }

    /// Parse includes plus the target template; returns the target's name.
    fn parse_into(&self, tera: &mut Tera, path: &Path) -> Result<String, RenderError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| normalize_template_name(path));

        let mut templates = self.includes.clone();
        templates.push((name.clone(), contents));
        tera.add_raw_templates(templates)
            .map_err(|e| parse_err(path, e))?;
        Ok(name)
    }
}

fn new_tera() -> Tera {
    let mut tera = Tera::default();
    // Outputs are Containerfiles, never HTML.
    tera.autoescape_on(vec![]);
    tera
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::registry::{Args, ResultKind, TemplateFunction};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// `digest(ref=...)` records `image:<ref>` and returns a fake digest;
    /// counts real invocations.
    fn registry(counter: Arc<AtomicUsize>) -> FunctionRegistry {
        FunctionRegistry::new().with(move |sink: Arc<dyn MaterialSink>| {
            let counter = Arc::clone(&counter);
            vec![
                TemplateFunction::new("digest", ResultKind::Text, move |a: &Args| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let r = args::string(a, "digest", "ref")?;
                    sink.record(&format!("image:{r}"), "abc123");
                    Ok(Value::from(format!("{r}@sha256:abc123")))
                }),
                TemplateFunction::new("packages", ResultKind::Map, |_: &Args| {
                    Ok(serde_json::json!({"musl": "1.2"}))
                }),
                TemplateFunction::new("fail", ResultKind::Text, |_: &Args| {
                    Err(tera::Error::msg("upstream unavailable"))
                }),
            ]
        })
    }

    #[test]
    fn render_returns_output_and_ledger() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(tmp.path(), "Dockerfile.tera", "FROM {{ digest(ref=\"base\") }}\n");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();

        let rendered = engine.render(&tpl).unwrap();
        assert_eq!(rendered.content, "FROM base@sha256:abc123\n");
        assert_eq!(rendered.ledger.get("image:base").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn ledger_is_fresh_for_every_render() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a/Dockerfile.tera", "{{ digest(ref=\"one\") }}");
        let b = write(tmp.path(), "b/Dockerfile.tera", "{{ digest(ref=\"two\") }}");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();

        engine.render(&a).unwrap();
        let second = engine.render(&b).unwrap();
        assert_eq!(second.ledger.len(), 1);
        assert!(second.ledger.contains_key("image:two"));
    }

    #[test]
    fn dry_run_records_arguments_without_calling_functions() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(
            tmp.path(),
            "Dockerfile.tera",
            "FROM {{ digest(ref=\"base\") }}\n\
             {% for name, version in packages(names=[\"musl\"]) %}{{ name }}{% endfor %}\n\
             {{ digest(ref=\"registry.example.com/other\") }}\n\
             {{ fail() }}\n",
        );
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = TemplateEngine::new(registry(counter.clone()), None).unwrap();

        let calls = engine.dry_run(&tpl).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0, "dry run must not invoke real functions");
        assert_eq!(
            calls.string_args("digest", "ref"),
            vec!["base", "registry.example.com/other"]
        );
        assert_eq!(calls.calls("packages").len(), 1);
        assert_eq!(calls.calls("fail").len(), 1);
        assert!(calls.calls("never").is_empty());
    }

    #[test]
    fn failing_function_aborts_render() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(tmp.path(), "Dockerfile.tera", "before\n{{ fail() }}\nafter\n");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();

        let err = engine.render(&tpl).unwrap_err();
        assert!(matches!(err, RenderError::Execute { .. }), "got: {err}");
        assert!(err.to_string().contains("upstream unavailable"), "got: {err}");
    }

    #[test]
    fn parse_error_is_reported_in_both_modes() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(tmp.path(), "Dockerfile.tera", "{% if %}\n");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();

        assert!(matches!(engine.render(&tpl), Err(RenderError::Parse { .. })));
        assert!(matches!(engine.dry_run(&tpl), Err(RenderError::Parse { .. })));
    }

    #[test]
    fn unknown_function_fails_dry_run() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(tmp.path(), "Dockerfile.tera", "{{ nope() }}");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();
        assert!(matches!(engine.dry_run(&tpl), Err(RenderError::Execute { .. })));
    }

    #[test]
    fn missing_template_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();
        let err = engine.render(&tmp.path().join("absent.tera")).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }

    #[test]
    fn includes_are_available_to_templates() {
        let tmp = TempDir::new().unwrap();
        let includes = tmp.path().join("includes");
        write(&includes, "Common/Labels.tera", "LABEL maintainer=\"ops\"");
        write(&includes, "notes.txt", "ignored");
        let tpl = write(
            tmp.path(),
            "app/Dockerfile.tera",
            "FROM scratch\n{% include \"common/labels.tera\" %}\n",
        );
        let engine = TemplateEngine::new(registry(Arc::default()), Some(&includes)).unwrap();

        assert_eq!(engine.include_names(), vec!["common/labels.tera"]);
        let rendered = engine.render(&tpl).unwrap();
        assert_eq!(rendered.content, "FROM scratch\nLABEL maintainer=\"ops\"\n");
    }

    #[test]
    fn output_is_not_html_escaped() {
        let tmp = TempDir::new().unwrap();
        let tpl = write(tmp.path(), "index.html", "{{ digest(ref=\"a&b\") }}");
        let engine = TemplateEngine::new(registry(Arc::default()), None).unwrap();
        assert_eq!(engine.render(&tpl).unwrap().content, "a&b@sha256:abc123");
    }
}
