//! Example runner: load a script, call its entry point, normalize the result
//!
//! Scripts are reached through the [`ExampleLoader`] seam so the runner never
//! cares how a script is executed. Every run gets its own [`CaptureContext`]
//! and every failure is turned into an [`ExampleOutcome`] so a batch keeps
//! going past a broken script.

use crate::collector::{CaptureContext, CapturedModel};
use crate::config::Overrides;
use crate::error::LoadError;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loosely typed value returned from a script's entry point.
///
/// Only four shapes are accepted: nothing, a bare model, a `(model, overrides)`
/// pair, or a sequence of `(model, name, overrides)` triples.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue<M> {
    None,
    Model(M),
    Text(String),
    Map(Overrides),
    Sequence(Vec<ScriptValue<M>>),
    /// Anything else, described for error messages (e.g. `number 3`).
    Other(String),
}

impl<M> ScriptValue<M> {
    pub fn pair(model: M, overrides: Overrides) -> Self {
        ScriptValue::Sequence(vec![ScriptValue::Model(model), ScriptValue::Map(overrides)])
    }

    pub fn triple(model: M, name: impl Into<String>, overrides: Overrides) -> Self {
        ScriptValue::Sequence(vec![
            ScriptValue::Model(model),
            ScriptValue::Text(name.into()),
            ScriptValue::Map(overrides),
        ])
    }

    fn describe(&self) -> String {
        match self {
            ScriptValue::None => "None".to_string(),
            ScriptValue::Model(_) => "model".to_string(),
            ScriptValue::Text(text) => format!("string {:?}", text),
            ScriptValue::Map(_) => "mapping".to_string(),
            ScriptValue::Sequence(items) => format!("sequence of {} items", items.len()),
            ScriptValue::Other(description) => description.clone(),
        }
    }
}

impl<M> From<Vec<CapturedModel<M>>> for ScriptValue<M> {
    fn from(models: Vec<CapturedModel<M>>) -> Self {
        ScriptValue::Sequence(
            models
                .into_iter()
                .map(|c| ScriptValue::triple(c.model, c.name, c.overrides))
                .collect(),
        )
    }
}

/// A loaded script whose entry point has not run yet.
pub trait ExampleProgram<M> {
    /// Call the zero-argument entry point once.
    fn main(self: Box<Self>, ctx: &mut CaptureContext<M>) -> Result<ScriptValue<M>, LoadError>;
}

/// Turns a script path into a runnable program.
pub trait ExampleLoader {
    type Model;

    /// Load the script at `path`. Top-level code may already save captures
    /// into `ctx`. Returns `Ok(None)` when the script has no entry point.
    fn load(
        &self,
        path: &Path,
        ctx: &mut CaptureContext<Self::Model>,
    ) -> Result<Option<Box<dyn ExampleProgram<Self::Model> + '_>>, LoadError>;
}

/// Result of running one script.
#[derive(Debug)]
pub enum ExampleOutcome<M> {
    Captured(Vec<CapturedModel<M>>),
    SkippedNoEntryPoint,
    SkippedEmptyResult,
    Failed(LoadError),
}

impl<M> ExampleOutcome<M> {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExampleOutcome::Failed(_))
    }
}

/// Name used for a script's single model: the file stem.
pub fn script_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct ExampleRunner<L> {
    loader: L,
}

impl<L: ExampleLoader> ExampleRunner<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Run one script with a fresh capture context.
    pub fn run(&self, path: &Path) -> ExampleOutcome<L::Model> {
        let script = script_name(path);
        let mut ctx = CaptureContext::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(path, &mut ctx)));

        let value = match result {
            Ok(Ok(Some(value))) => value,
            Ok(Ok(None)) => return ExampleOutcome::SkippedNoEntryPoint,
            Ok(Err(err)) => return ExampleOutcome::Failed(err),
            Err(payload) => {
                return ExampleOutcome::Failed(LoadError::Panicked {
                    script,
                    message: panic_message(payload.as_ref()),
                })
            }
        };

        match normalize(&script, value) {
            Ok(models) if models.is_empty() => ExampleOutcome::SkippedEmptyResult,
            Ok(models) => ExampleOutcome::Captured(models),
            Err(err) => ExampleOutcome::Failed(err),
        }
    }

    fn execute(
        &self,
        path: &Path,
        ctx: &mut CaptureContext<L::Model>,
    ) -> Result<Option<ScriptValue<L::Model>>, LoadError> {
        ctx.clear();
        let program = match self.loader.load(path, ctx)? {
            Some(program) => program,
            None => return Ok(None),
        };
        debug!(script = %path.display(), "calling main()");
        program.main(ctx).map(Some)
    }
}

/// Reconcile the accepted return shapes into captured models.
///
/// Malformed elements of a triple sequence are dropped with a warning; any
/// shape outside the accepted four is an error for the whole script.
pub fn normalize<M>(script: &str, value: ScriptValue<M>) -> Result<Vec<CapturedModel<M>>, LoadError> {
    match value {
        ScriptValue::None => Ok(Vec::new()),
        ScriptValue::Model(model) => Ok(vec![CapturedModel::new(model, script, Overrides::new())]),
        ScriptValue::Sequence(items) if starts_with_model(&items) && items.len() == 2 => {
            normalize_pair(script, items)
        }
        // A bare (model, name, config) is not a sequence of captures.
        ScriptValue::Sequence(items) if starts_with_model(&items) => Err(LoadError::UnsupportedReturn {
            script: script.to_string(),
            found: format!("model-led sequence of {} items", items.len()),
        }),
        ScriptValue::Sequence(items) => {
            let mut models = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match into_triple(item) {
                    Ok(captured) => models.push(captured),
                    Err(found) => warn!(
                        script,
                        index, "dropping malformed capture (expected (model, name, config), got {})", found
                    ),
                }
            }
            Ok(models)
        }
        other => Err(LoadError::UnsupportedReturn {
            script: script.to_string(),
            found: other.describe(),
        }),
    }
}

fn starts_with_model<M>(items: &[ScriptValue<M>]) -> bool {
    matches!(items.first(), Some(ScriptValue::Model(_)))
}

fn normalize_pair<M>(
    script: &str,
    items: Vec<ScriptValue<M>>,
) -> Result<Vec<CapturedModel<M>>, LoadError> {
    let found = match <[ScriptValue<M>; 2]>::try_from(items) {
        Ok([ScriptValue::Model(model), ScriptValue::Map(overrides)]) => {
            return Ok(vec![CapturedModel::new(model, script, overrides)])
        }
        Ok([ScriptValue::Model(model), ScriptValue::None]) => {
            return Ok(vec![CapturedModel::new(model, script, Overrides::new())])
        }
        Ok([first, second]) => format!("({}, {}) pair", first.describe(), second.describe()),
        Err(items) => format!("sequence of {} items", items.len()),
    };

    Err(LoadError::UnsupportedReturn {
        script: script.to_string(),
        found,
    })
}

fn into_triple<M>(item: ScriptValue<M>) -> Result<CapturedModel<M>, String> {
    let description = item.describe();
    let ScriptValue::Sequence(parts) = item else {
        return Err(description);
    };

    match <[ScriptValue<M>; 3]>::try_from(parts) {
        Ok([ScriptValue::Model(model), ScriptValue::Text(name), ScriptValue::Map(overrides)]) => {
            Ok(CapturedModel::new(model, name, overrides))
        }
        Ok([ScriptValue::Model(model), ScriptValue::Text(name), ScriptValue::None]) => {
            Ok(CapturedModel::new(model, name, Overrides::new()))
        }
        _ => Err(description),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

type EntryFn<M> = Box<dyn Fn(&mut CaptureContext<M>) -> Result<ScriptValue<M>, String>>;
type SetupFn<M> = Box<dyn Fn(&mut CaptureContext<M>) -> Result<(), String>>;

struct FnUnit<M> {
    setup: Option<SetupFn<M>>,
    entry: Option<EntryFn<M>>,
}

/// In-process loader backed by Rust closures registered per path.
///
/// Useful for embedding examples directly in a Rust program and for tests.
pub struct FnLoader<M> {
    units: HashMap<PathBuf, FnUnit<M>>,
}

impl<M> FnLoader<M> {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
        }
    }

    /// Register a script whose entry point is `entry`.
    pub fn register<F>(&mut self, path: impl Into<PathBuf>, entry: F) -> &mut Self
    where
        F: Fn(&mut CaptureContext<M>) -> Result<ScriptValue<M>, String> + 'static,
    {
        self.units.insert(
            path.into(),
            FnUnit {
                setup: None,
                entry: Some(Box::new(entry)),
            },
        );
        self
    }

    /// Register a script with load-time code and an optional entry point.
    pub fn register_module<S>(
        &mut self,
        path: impl Into<PathBuf>,
        setup: S,
        entry: Option<EntryFn<M>>,
    ) -> &mut Self
    where
        S: Fn(&mut CaptureContext<M>) -> Result<(), String> + 'static,
    {
        self.units.insert(
            path.into(),
            FnUnit {
                setup: Some(Box::new(setup)),
                entry,
            },
        );
        self
    }
}

impl<M> Default for FnLoader<M> {
    fn default() -> Self {
        Self::new()
    }
}

struct FnProgram<'a, M> {
    script: String,
    entry: &'a EntryFn<M>,
}

impl<M> ExampleProgram<M> for FnProgram<'_, M> {
    fn main(self: Box<Self>, ctx: &mut CaptureContext<M>) -> Result<ScriptValue<M>, LoadError> {
        (self.entry)(ctx).map_err(|message| LoadError::Execution {
            script: self.script,
            message,
        })
    }
}

impl<M: 'static> ExampleLoader for FnLoader<M> {
    type Model = M;

    fn load(
        &self,
        path: &Path,
        ctx: &mut CaptureContext<M>,
    ) -> Result<Option<Box<dyn ExampleProgram<M> + '_>>, LoadError> {
        let script = script_name(path);
        let unit = self.units.get(path).ok_or_else(|| LoadError::Load {
            script: script.clone(),
            message: format!("no example registered at {}", path.display()),
        })?;

        if let Some(setup) = &unit.setup {
            setup(ctx).map_err(|message| LoadError::Load {
                script: script.clone(),
                message,
            })?;
        }

        Ok(unit.entry.as_ref().map(|entry| {
            Box::new(FnProgram { script, entry }) as Box<dyn ExampleProgram<M> + '_>
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overrides(value: serde_json::Value) -> Overrides {
        value.as_object().cloned().unwrap()
    }

    fn run(loader: FnLoader<&'static str>, path: &str) -> ExampleOutcome<&'static str> {
        ExampleRunner::new(loader).run(Path::new(path))
    }

    #[test]
    fn test_bare_model_uses_file_stem() {
        let mut loader = FnLoader::new();
        loader.register("examples/box.py", |_| Ok(ScriptValue::Model("box-solid")));

        match run(loader, "examples/box.py") {
            ExampleOutcome::Captured(models) => {
                assert_eq!(models.len(), 1);
                assert_eq!(models[0].name, "box");
                assert_eq!(models[0].model, "box-solid");
                assert!(models[0].overrides.is_empty());
            }
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_keeps_overrides() {
        let mut loader = FnLoader::new();
        loader.register("box.py", |_| {
            Ok(ScriptValue::pair("solid", overrides(json!({ "cadWidth": 300 }))))
        });

        match run(loader, "box.py") {
            ExampleOutcome::Captured(models) => {
                assert_eq!(models[0].name, "box");
                assert_eq!(models[0].overrides["cadWidth"], json!(300));
            }
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_with_none_overrides() {
        let mut loader = FnLoader::new();
        loader.register("plate.py", |_| {
            Ok(ScriptValue::Sequence(vec![ScriptValue::Model("plate"), ScriptValue::None]))
        });

        match run(loader, "plate.py") {
            ExampleOutcome::Captured(models) => assert!(models[0].overrides.is_empty()),
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_drained_captures_keep_names_and_order() {
        let mut loader = FnLoader::new();
        loader.register("incremental.py", |ctx| {
            ctx.save("a", "step1", None);
            ctx.save("b", "step2", None);
            Ok(ctx.drain().into())
        });

        match run(loader, "incremental.py") {
            ExampleOutcome::Captured(models) => {
                let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["step1", "step2"]);
            }
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_load_time_saves_are_visible_to_main() {
        let mut loader = FnLoader::new();
        loader.register_module(
            "incremental.py",
            |ctx| {
                ctx.save("box", "incremental_step1_box", None);
                Ok(())
            },
            Some(Box::new(|ctx: &mut CaptureContext<&'static str>| {
                Ok::<_, String>(ScriptValue::from(ctx.drain()))
            })),
        );

        match run(loader, "incremental.py") {
            ExampleOutcome::Captured(models) => assert_eq!(models[0].name, "incremental_step1_box"),
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_entry_point_is_skipped() {
        let mut loader = FnLoader::new();
        loader.register_module("helpers.py", |_| Ok(()), None);

        assert!(matches!(run(loader, "helpers.py"), ExampleOutcome::SkippedNoEntryPoint));
    }

    #[test]
    fn test_none_and_empty_sequence_are_skipped() {
        let mut loader: FnLoader<&'static str> = FnLoader::new();
        loader.register("none.py", |_| Ok(ScriptValue::None));
        loader.register("empty.py", |_| Ok(ScriptValue::Sequence(Vec::new())));
        let runner = ExampleRunner::new(loader);

        assert!(matches!(runner.run(Path::new("none.py")), ExampleOutcome::SkippedEmptyResult));
        assert!(matches!(runner.run(Path::new("empty.py")), ExampleOutcome::SkippedEmptyResult));
    }

    #[test]
    fn test_malformed_triples_are_dropped() {
        let mut loader = FnLoader::new();
        loader.register("mixed.py", |_| {
            Ok(ScriptValue::Sequence(vec![
                ScriptValue::triple("a", "first", Overrides::new()),
                ScriptValue::Text("oops".to_string()),
                ScriptValue::Sequence(vec![ScriptValue::Model("b"), ScriptValue::Text("short".to_string())]),
                ScriptValue::triple("c", "third", Overrides::new()),
            ]))
        });

        match run(loader, "mixed.py") {
            ExampleOutcome::Captured(models) => {
                let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["first", "third"]);
            }
            other => panic!("expected captured models, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_shapes_fail() {
        let mut loader = FnLoader::new();
        loader.register("text.py", |_| Ok(ScriptValue::Text("box".to_string())));
        loader.register("number.py", |_| Ok(ScriptValue::Other("number 3".to_string())));
        loader.register("bad_pair.py", |_| {
            Ok(ScriptValue::Sequence(vec![ScriptValue::Model("a"), ScriptValue::Text("x".to_string())]))
        });
        let runner = ExampleRunner::new(loader);

        for script in ["text.py", "number.py", "bad_pair.py"] {
            match runner.run(Path::new(script)) {
                ExampleOutcome::Failed(LoadError::UnsupportedReturn { script: name, .. }) => {
                    assert_eq!(name, script_name(Path::new(script)));
                }
                other => panic!("expected unsupported return for {}, got {:?}", script, other),
            }
        }
    }

    #[test]
    fn test_bare_triple_is_unsupported() {
        let mut loader = FnLoader::new();
        loader.register("triple.py", |_| {
            Ok(ScriptValue::triple("solid", "named", overrides(json!({ "cadWidth": 300 }))))
        });

        match run(loader, "triple.py") {
            ExampleOutcome::Failed(LoadError::UnsupportedReturn { script, found }) => {
                assert_eq!(script, "triple");
                assert!(found.contains("3 items"));
            }
            other => panic!("expected unsupported return, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_errors_and_panics_are_contained() {
        let mut loader = FnLoader::new();
        loader.register("raises.py", |_| Err("division by zero".to_string()));
        loader.register("panics.py", |_| panic!("bad geometry"));
        loader.register("ok.py", |_| Ok(ScriptValue::Model("fine")));
        let runner = ExampleRunner::new(loader);

        match runner.run(Path::new("raises.py")) {
            ExampleOutcome::Failed(LoadError::Execution { script, message }) => {
                assert_eq!(script, "raises");
                assert_eq!(message, "division by zero");
            }
            other => panic!("expected execution failure, got {:?}", other),
        }
        match runner.run(Path::new("panics.py")) {
            ExampleOutcome::Failed(LoadError::Panicked { message, .. }) => {
                assert_eq!(message, "bad geometry")
            }
            other => panic!("expected panic failure, got {:?}", other),
        }
        assert!(matches!(runner.run(Path::new("ok.py")), ExampleOutcome::Captured(_)));
    }

    #[test]
    fn test_unregistered_path_is_load_error() {
        let outcome = run(FnLoader::new(), "missing.py");
        assert!(matches!(outcome, ExampleOutcome::Failed(LoadError::Load { .. })));
    }

    #[test]
    fn test_each_run_starts_with_empty_context() {
        let mut loader = FnLoader::new();
        loader.register("leaky.py", |ctx| {
            ctx.save("x", "leaked", None);
            Ok(ScriptValue::None)
        });
        loader.register("reader.py", |ctx| {
            assert!(ctx.is_empty());
            Ok(ctx.drain().into())
        });
        let runner = ExampleRunner::new(loader);

        runner.run(Path::new("leaky.py"));
        assert!(matches!(runner.run(Path::new("reader.py")), ExampleOutcome::SkippedEmptyResult));
    }
}
