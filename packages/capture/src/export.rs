//! Model export: merge display options and serialize geometry

use crate::collector::CapturedModel;
use crate::config::DisplayConfig;
use crate::document::ViewerDocument;
use crate::error::{ExportError, GeometryError};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Serializes a model handle into the viewer's geometry tree.
pub trait GeometryExporter<M> {
    fn export(&self, model: &M) -> Result<Value, GeometryError>;
}

impl<M, F> GeometryExporter<M> for F
where
    F: Fn(&M) -> Result<Value, GeometryError>,
{
    fn export(&self, model: &M) -> Result<Value, GeometryError> {
        self(model)
    }
}

/// For scripts that already emit tessellated viewer geometry.
///
/// The handle must be a JSON object carrying a `parts` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExporter;

impl GeometryExporter<Value> for PassthroughExporter {
    fn export(&self, model: &Value) -> Result<Value, GeometryError> {
        let object = model
            .as_object()
            .ok_or_else(|| GeometryError::Invalid(format!("expected an object, got {}", kind(model))))?;

        match object.get("parts") {
            Some(Value::Array(_)) => Ok(model.clone()),
            Some(other) => Err(GeometryError::Invalid(format!(
                "`parts` must be an array, got {}",
                kind(other)
            ))),
            None => Err(GeometryError::Invalid("missing `parts`".to_string())),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Runs an external exporter: the model is written to its stdin as JSON and
/// the geometry tree is read back from stdout.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    program: String,
    args: Vec<String>,
}

impl CommandExporter {
    /// Build from a command line such as `["python3", "export.py"]`.
    /// Returns `None` for an empty command.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl<M: Serialize> GeometryExporter<M> for CommandExporter {
    fn export(&self, model: &M) -> Result<Value, GeometryError> {
        let input = serde_json::to_vec(model)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is fed on its own thread while stdout drains.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeometryError::Exporter(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| GeometryError::Exporter("stdin writer panicked".to_string()))??;
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Turns captured models into viewer documents.
pub struct ModelExporter<E> {
    defaults: DisplayConfig,
    exporter: E,
}

impl<E> ModelExporter<E> {
    pub fn new(defaults: DisplayConfig, exporter: E) -> Self {
        Self { defaults, exporter }
    }

    pub fn defaults(&self) -> &DisplayConfig {
        &self.defaults
    }

    /// Export one model produced by `script`.
    pub fn export<M>(&self, script: &str, captured: CapturedModel<M>) -> Result<ViewerDocument, ExportError>
    where
        E: GeometryExporter<M>,
    {
        let config = self.defaults.merge(&captured.overrides);

        let model = self.exporter.export(&captured.model).map_err(|source| ExportError {
            script: script.to_string(),
            model: captured.name.clone(),
            source,
        })?;

        debug!(script, model = %captured.name, "exported geometry");
        Ok(ViewerDocument::new(captured.name, model, config))
    }

    /// Export all models of one script in order. The first failure abandons
    /// the models that follow it.
    pub fn export_script<M>(
        &self,
        script: &str,
        models: Vec<CapturedModel<M>>,
    ) -> Result<Vec<ViewerDocument>, ExportError>
    where
        E: GeometryExporter<M>,
    {
        models
            .into_iter()
            .map(|captured| self.export(script, captured))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use serde_json::json;
    use std::cell::Cell;

    fn overrides(value: Value) -> Overrides {
        value.as_object().cloned().unwrap()
    }

    fn geometry(name: &str) -> Value {
        json!({ "name": name, "parts": [] })
    }

    #[test]
    fn test_export_wraps_geometry_and_merged_config() {
        let exporter = ModelExporter::new(DisplayConfig::defaults(), PassthroughExporter);
        let captured = CapturedModel::new(geometry("box"), "box", overrides(json!({ "cadWidth": 300 })));

        let document = exporter.export("box", captured).unwrap();
        assert_eq!(document.name, "box");
        assert_eq!(document.model, geometry("box"));
        assert_eq!(document.config.get("cadWidth"), Some(&json!(300)));
        assert_eq!(document.config.height(), crate::DEFAULT_HEIGHT);
        assert_eq!(exporter.defaults(), &DisplayConfig::defaults());
    }

    #[test]
    fn test_passthrough_rejects_invalid_geometry() {
        assert!(PassthroughExporter.export(&json!("box")).is_err());
        assert!(PassthroughExporter.export(&json!({ "name": "box" })).is_err());
        assert!(PassthroughExporter.export(&json!({ "parts": {} })).is_err());
        assert!(PassthroughExporter.export(&json!({ "parts": [] })).is_ok());
    }

    #[test]
    fn test_export_failure_abandons_rest_of_script() {
        let calls = Cell::new(0);
        let failing = |model: &&str| {
            calls.set(calls.get() + 1);
            if *model == "bad" {
                Err(GeometryError::Invalid("self-intersecting".to_string()))
            } else {
                Ok(json!({ "parts": [] }))
            }
        };
        let exporter = ModelExporter::new(DisplayConfig::defaults(), failing);

        let models = vec![
            CapturedModel::new("good", "step1", Overrides::new()),
            CapturedModel::new("bad", "step2", Overrides::new()),
            CapturedModel::new("good", "step3", Overrides::new()),
        ];

        let err = exporter.export_script("incremental", models).unwrap_err();
        assert_eq!(err.script, "incremental");
        assert_eq!(err.model, "step2");
        assert_eq!(calls.get(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exporter_round_trips_through_process() {
        let exporter = CommandExporter::new(&["cat".to_string()]).unwrap();
        let model = json!({ "parts": [{ "id": "/Group/Solid" }] });

        assert_eq!(exporter.export(&model).unwrap(), model);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exporter_reports_failure() {
        let command = vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null; echo broken >&2; exit 3".to_string()];
        let exporter = CommandExporter::new(&command).unwrap();

        match exporter.export(&json!({})) {
            Err(GeometryError::Exporter(message)) => assert!(message.contains("broken")),
            other => panic!("expected exporter failure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(CommandExporter::new(&[]).is_none());
    }
}
