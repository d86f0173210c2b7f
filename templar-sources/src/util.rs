//! Small helpers for building values inside templates.

use std::sync::Arc;

use tera::Value;

use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

/// Provides `increment_int(value)`, `map(pairs)` and `arr(items)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilSource;

fn increment_int(a: &Args) -> tera::Result<Value> {
    let value = args::int(a, "increment_int", "value")?;
    value
        .checked_add(1)
        .map(Value::from)
        .ok_or_else(|| tera::Error::msg("`increment_int` overflowed"))
}

/// Object from an alternating key/value list.
fn map(a: &Args) -> tera::Result<Value> {
    let pairs = args::list(a, "map", "pairs")?;
    if pairs.len() % 2 != 0 {
        return Err(tera::Error::msg("`map` needs an even number of items in `pairs`"));
    }
    let mut out = serde_json::Map::new();
    for pair in pairs.chunks(2) {
        let Value::String(key) = &pair[0] else {
            return Err(tera::Error::msg(format!("`map` keys must be strings, got {}", pair[0])));
        };
        out.insert(key.clone(), pair[1].clone());
    }
    Ok(Value::Object(out))
}

fn arr(a: &Args) -> tera::Result<Value> {
    args::list(a, "arr", "items").map(Value::Array)
}

/// These helpers never reach upstream, so a dry run evaluates them for real.
fn evaluated(
    kind: ResultKind,
    helper: fn(&Args) -> tera::Result<Value>,
) -> impl Fn(&Args) -> Value + Send + Sync + 'static {
    move |a: &Args| helper(a).unwrap_or_else(|_| kind.zero_value())
}

impl FunctionSource for UtilSource {
    fn functions(&self, _sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        vec![
            TemplateFunction::new("increment_int", ResultKind::Int, increment_int)
                .with_stub(evaluated(ResultKind::Int, increment_int)),
            TemplateFunction::new("map", ResultKind::Map, map)
                .with_stub(evaluated(ResultKind::Map, map)),
            TemplateFunction::new("arr", ResultKind::List, arr)
                .with_stub(evaluated(ResultKind::List, arr)),
        ]
    }
}
