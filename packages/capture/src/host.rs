//! Script host: run example scripts as child processes
//!
//! A script talks to the runner through newline-delimited JSON on stdout:
//!
//! ```text
//! {"event": "save", "model": {...}, "name": "step1", "config": {"cadWidth": 500}}
//! {"event": "clear"}
//! {"event": "return", "value": [{"$model": {...}}, {"cadWidth": 500}]}
//! ```
//!
//! In a return value `{"$model": ...}` marks a model handle, `{"$saved": true}`
//! stands for everything saved so far, other objects are override maps and
//! arrays are tuples or sequences. A script that exits cleanly without a
//! `return` event has no entry point. Any other stdout line is plain output.
//!
//! Python scripts can use [`PYTHON_HELPER`] instead of writing the messages
//! by hand:
//!
//! ```python
//! from cadshot_helper import model, save_model, get_saved_models, run
//!
//! def main():
//!     save_model(step_one, "step1")
//!     save_model(step_two, "step2", {"cadWidth": 500})
//!     return get_saved_models()
//!
//! if __name__ == "__main__":
//!     run(main)
//! ```
//!
//! `return model(box), {"cadWidth": 300}` returns a single model with
//! overrides.

use crate::collector::CaptureContext;
use crate::error::LoadError;
use crate::runner::{script_name, ExampleLoader, ExampleProgram, ScriptValue};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Python module implementing the script side of the protocol:
/// `save_model`, `clear_saved`, `get_saved_models`, `model` and `run`.
pub const PYTHON_HELPER: &str = include_str!("../scripts/cadshot_helper.py");

const STDERR_TAIL_LINES: usize = 20;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ProcessLoaderOptions {
    /// Command used to run a script, keyed by file extension. Scripts with an
    /// unmapped extension are executed directly.
    pub interpreters: HashMap<String, Vec<String>>,

    /// Environment variable the script's directory is prepended to, so
    /// sibling modules resolve. Only the child's environment changes.
    pub search_path_var: Option<String>,

    /// Kill scripts that run longer than this.
    pub timeout: Option<Duration>,
}

impl Default for ProcessLoaderOptions {
    fn default() -> Self {
        let mut interpreters = HashMap::new();
        interpreters.insert("py".to_string(), vec!["python3".to_string()]);

        Self {
            interpreters,
            search_path_var: Some("PYTHONPATH".to_string()),
            timeout: None,
        }
    }
}

/// Loads scripts by running them through their interpreter.
#[derive(Debug, Clone, Default)]
pub struct ProcessLoader {
    options: ProcessLoaderOptions,
}

impl ProcessLoader {
    pub fn new(options: ProcessLoaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProcessLoaderOptions {
        &self.options
    }

    /// Whether `path` has an interpreter mapping.
    pub fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.options.interpreters.contains_key(ext))
            .unwrap_or(false)
    }

    fn command(&self, path: &Path) -> Command {
        // The child runs in the script's directory, so relative paths would
        // resolve twice.
        let path = &absolute(path);
        let interpreter = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.options.interpreters.get(ext))
            .and_then(|command| command.split_first());

        let mut command = match interpreter {
            Some((program, args)) => {
                let mut command = Command::new(program);
                command.args(args).arg(path);
                command
            }
            None => Command::new(path),
        };

        let dir = script_dir(path);
        if let Some(var) = &self.options.search_path_var {
            command.env(var, prepend_search_path(&dir, std::env::var_os(var)));
        }

        command
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn script_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn prepend_search_path(dir: &Path, existing: Option<OsString>) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = existing {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}

impl ExampleLoader for ProcessLoader {
    type Model = Value;

    fn load(
        &self,
        path: &Path,
        ctx: &mut CaptureContext<Value>,
    ) -> Result<Option<Box<dyn ExampleProgram<Value> + '_>>, LoadError> {
        let script = script_name(path);

        let mut child = self.command(path).spawn().map_err(|e| LoadError::Load {
            script: script.clone(),
            message: format!("failed to start {}: {}", path.display(), e),
        })?;

        let stderr = child.stderr.take().map(|stderr| thread::spawn(move || tail(stderr)));
        let lines = match child.stdout.take() {
            Some(stdout) => spawn_line_reader(stdout),
            None => {
                let _ = child.kill();
                return Err(LoadError::Load {
                    script,
                    message: "stdout was not captured".to_string(),
                });
            }
        };

        let mut returned = None;
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let line = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match lines.recv_timeout(remaining) {
                        Ok(line) => line,
                        Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            kill(&mut child);
                            return Err(LoadError::Timeout {
                                script,
                                seconds: self.options.timeout.unwrap_or_default().as_secs_f64(),
                            });
                        }
                    }
                }
                None => match lines.recv() {
                    Ok(line) => line,
                    Err(_) => break,
                },
            };

            if let Err(message) = handle_line(&script, &line, ctx, &mut returned) {
                kill(&mut child);
                return Err(LoadError::Load { script, message });
            }
        }

        // Stdout may close long before the process exits.
        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill(&mut child);
                return Err(LoadError::Timeout {
                    script,
                    seconds: self.options.timeout.unwrap_or_default().as_secs_f64(),
                });
            }
            Err(e) => {
                return Err(LoadError::Load {
                    script,
                    message: e.to_string(),
                })
            }
        };
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let message = if stderr.is_empty() {
                format!("exited with {}", status)
            } else {
                format!("exited with {}\n{}", status, stderr)
            };
            return Err(LoadError::Execution { script, message });
        }

        Ok(returned.map(|value| Box::new(ReturnedValue { value }) as Box<dyn ExampleProgram<Value> + '_>))
    }
}

fn spawn_line_reader(stdout: impl Read + Send + 'static) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn tail(stream: impl Read) -> String {
    let mut lines = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stream).lines().map_while(Result::ok) {
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }
    Vec::from(lines).join("\n")
}

/// Wait for the child to exit, giving up at `deadline`.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        thread::sleep(remaining.min(EXIT_POLL_INTERVAL));
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Apply one stdout line. Protocol messages are JSON objects with an `event`
/// field; everything else is script output.
fn handle_line(
    script: &str,
    line: &str,
    ctx: &mut CaptureContext<Value>,
    returned: &mut Option<Value>,
) -> Result<(), String> {
    let message = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(message)) if message.contains_key("event") => message,
        _ => {
            debug!(script, "{}", line);
            return Ok(());
        }
    };

    match message.get("event").and_then(Value::as_str) {
        Some("save") => {
            let model = message
                .get("model")
                .cloned()
                .ok_or_else(|| "save message without `model`".to_string())?;
            let name = message
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| "save message without a string `name`".to_string())?;
            let overrides = match message.get("config") {
                None | Some(Value::Null) => None,
                Some(Value::Object(config)) => Some(config.clone()),
                Some(_) => return Err(format!("save message for {} has a non-object `config`", name)),
            };
            ctx.save(model, name, overrides);
        }
        Some("clear") => ctx.clear(),
        Some("return") => {
            *returned = Some(message.get("value").cloned().unwrap_or(Value::Null));
        }
        other => warn!(script, event = ?other, "ignoring unknown script event"),
    }

    Ok(())
}

struct ReturnedValue {
    value: Value,
}

impl ExampleProgram<Value> for ReturnedValue {
    fn main(self: Box<Self>, ctx: &mut CaptureContext<Value>) -> Result<ScriptValue<Value>, LoadError> {
        Ok(decode(self.value, ctx))
    }
}

/// Decode a returned JSON value into the runner's loosely typed value.
fn decode(value: Value, ctx: &mut CaptureContext<Value>) -> ScriptValue<Value> {
    match value {
        Value::Null => ScriptValue::None,
        Value::Bool(b) => ScriptValue::Other(format!("boolean {}", b)),
        Value::Number(n) => ScriptValue::Other(format!("number {}", n)),
        Value::String(s) => ScriptValue::Text(s),
        Value::Array(items) => ScriptValue::Sequence(items.into_iter().map(|item| decode(item, ctx)).collect()),
        Value::Object(mut object) => {
            if object.len() == 1 {
                if let Some(model) = object.remove("$model") {
                    return ScriptValue::Model(model);
                }
                if object.get("$saved").and_then(Value::as_bool) == Some(true) {
                    return ctx.drain().into();
                }
            }
            ScriptValue::Map(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use serde_json::json;

    #[test]
    fn test_decode_shapes() {
        let mut ctx = CaptureContext::new();

        assert_eq!(decode(Value::Null, &mut ctx), ScriptValue::None);
        assert_eq!(
            decode(json!({ "$model": { "parts": [] } }), &mut ctx),
            ScriptValue::Model(json!({ "parts": [] }))
        );
        assert_eq!(
            decode(json!({ "cadWidth": 300 }), &mut ctx),
            ScriptValue::Map(json!({ "cadWidth": 300 }).as_object().cloned().unwrap())
        );
        assert_eq!(decode(json!(3), &mut ctx), ScriptValue::Other("number 3".to_string()));
        assert_eq!(decode(json!("box"), &mut ctx), ScriptValue::Text("box".to_string()));
    }

    #[test]
    fn test_decode_saved_marker_drains_context() {
        let mut ctx = CaptureContext::new();
        ctx.save(json!({ "parts": [] }), "step1", None);

        let value = decode(json!({ "$saved": true }), &mut ctx);
        assert_eq!(
            value,
            ScriptValue::Sequence(vec![ScriptValue::triple(json!({ "parts": [] }), "step1", Overrides::new())])
        );
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_handle_line_routes_events() {
        let mut ctx = CaptureContext::new();
        let mut returned = None;

        handle_line("s", "building box...", &mut ctx, &mut returned).unwrap();
        handle_line("s", r#"{"event":"save","model":{"parts":[]},"name":"a"}"#, &mut ctx, &mut returned).unwrap();
        handle_line("s", r#"{"event":"clear"}"#, &mut ctx, &mut returned).unwrap();
        handle_line(
            "s",
            r#"{"event":"save","model":{"parts":[]},"name":"b","config":{"height":375}}"#,
            &mut ctx,
            &mut returned,
        )
        .unwrap();
        handle_line("s", r#"{"event":"return","value":{"$saved":true}}"#, &mut ctx, &mut returned).unwrap();

        let saved = ctx.drain();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "b");
        assert_eq!(saved[0].overrides["height"], json!(375));
        assert_eq!(returned, Some(json!({ "$saved": true })));
    }

    #[test]
    fn test_handle_line_rejects_bad_save() {
        let mut ctx = CaptureContext::new();
        let mut returned = None;

        assert!(handle_line("s", r#"{"event":"save","model":{}}"#, &mut ctx, &mut returned).is_err());
        assert!(handle_line("s", r#"{"event":"save","name":"x"}"#, &mut ctx, &mut returned).is_err());
        assert!(
            handle_line("s", r#"{"event":"save","model":{},"name":"x","config":3}"#, &mut ctx, &mut returned)
                .is_err()
        );
    }

    #[test]
    fn test_python_helper_speaks_the_protocol() {
        for needle in [
            r#""event": "save""#,
            r#""event": "clear""#,
            r#""event": "return""#,
            r#""$model""#,
            r#""$saved""#,
            "def save_model(",
            "def get_saved_models(",
        ] {
            assert!(PYTHON_HELPER.contains(needle), "helper is missing {}", needle);
        }
    }

    #[test]
    fn test_search_path_is_prepended() {
        let joined = prepend_search_path(Path::new("/examples"), Some(OsString::from("/lib")));
        let paths: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(paths, vec![PathBuf::from("/examples"), PathBuf::from("/lib")]);

        let joined = prepend_search_path(Path::new("/examples"), None);
        assert_eq!(joined, OsString::from("/examples"));
    }

    #[test]
    fn test_handles_mapped_extensions_only() {
        let loader = ProcessLoader::default();
        assert!(loader.handles(Path::new("examples/box.py")));
        assert!(!loader.handles(Path::new("examples/notes.txt")));
        assert!(!loader.handles(Path::new("examples/Makefile")));
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        let path = absolute(Path::new("examples/box.py"));
        assert!(path.is_absolute());
        assert!(path.ends_with("examples/box.py"));
        assert_eq!(absolute(Path::new("/tmp/box.py")), PathBuf::from("/tmp/box.py"));
    }

    #[test]
    fn test_script_dir_of_bare_file_is_cwd() {
        assert_eq!(script_dir(Path::new("box.py")), PathBuf::from("."));
        assert_eq!(script_dir(Path::new("examples/box.py")), PathBuf::from("examples"));
    }
}
