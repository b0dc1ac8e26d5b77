use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde_json::{Value, json};

use crate::error::{SimpipeError, SimpipeResult};

/// Candidate backend program names, primary first. The alternate covers the
/// underscore packaging variant shipped by some distributions.
pub const BACKEND_PROGRAMS: [&str; 2] = ["lerobot-sim", "lerobot_sim"];

/// Negotiated call form of the environment `reset` op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetForm {
    /// `{"op": "reset"}`
    Nullary,
    /// `{"op": "reset", "arg": null}`
    NullArg,
}

/// Negotiated call form of the environment `step` op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepForm {
    /// `{"op": "step", "action": ...}`
    Action,
    /// `{"op": "step", "action": ..., "context": {}}`
    ActionWithContext,
}

/// Capability record returned by the `hello` handshake.
///
/// Call forms are negotiated exactly once, here; the production loop never
/// re-probes. Absent fields deserialize to "not supported".
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub make_env: bool,
    /// Standalone entry point that owns its own frame cadence and output.
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub render: bool,
    #[serde(default)]
    pub reset: Option<ResetForm>,
    #[serde(default)]
    pub step: Option<StepForm>,
    #[serde(default)]
    pub action_space: bool,
}

/// Probe `candidates` in order and return the first program that answers
/// `--version` successfully.
pub fn locate(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|prog| probe(prog))
        .map(|prog| (*prog).to_string())
}

fn probe(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Handle to a spawned simulation backend process.
///
/// Requests and replies are single-line JSON over the child's stdin/stdout;
/// the child inherits stderr so backend noise lands on the diagnostic stream,
/// never in the frame stream. Construction performs the handshake; the
/// environment ops afterwards follow the cached [`Capabilities`].
pub struct Backend {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    caps: Capabilities,
}

impl Backend {
    pub fn spawn(program: &str) -> SimpipeResult<Self> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| SimpipeError::backend(format!("spawn backend '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SimpipeError::backend("backend stdin unavailable (unexpected)"))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SimpipeError::backend("backend stdout unavailable (unexpected)"))?;

        let mut backend = Self {
            child,
            stdin: Some(stdin),
            stdout,
            caps: Capabilities::default(),
        };
        backend.caps = backend.handshake()?;
        Ok(backend)
    }

    fn handshake(&mut self) -> SimpipeResult<Capabilities> {
        let reply = self.call(&json!({"op": "hello"}))?;
        let caps = reply
            .get("caps")
            .cloned()
            .ok_or_else(|| SimpipeError::backend("hello reply carried no capability record"))?;
        serde_json::from_value(caps)
            .map_err(|e| SimpipeError::backend(format!("malformed capability record: {e}")))
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// One request/reply round trip. Any transport or protocol failure is an
    /// error; per-op tolerance is decided by the callers.
    fn call(&mut self, request: &Value) -> SimpipeResult<Value> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SimpipeError::backend("backend is already closed"));
        };
        let mut line = serde_json::to_string(request)
            .map_err(|e| SimpipeError::backend(format!("encode request: {e}")))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| SimpipeError::backend(format!("write to backend: {e}")))?;

        let mut reply = String::new();
        let n = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| SimpipeError::backend(format!("read from backend: {e}")))?;
        if n == 0 {
            return Err(SimpipeError::backend("backend closed its pipe"));
        }

        let reply: Value = serde_json::from_str(reply.trim_end())
            .map_err(|e| SimpipeError::backend(format!("malformed reply: {e}")))?;
        if reply.get("ok").and_then(Value::as_bool) != Some(true) {
            let msg = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified backend failure");
            return Err(SimpipeError::backend(msg.to_string()));
        }
        Ok(reply)
    }

    /// Construct the environment through the backend's factory.
    pub fn make_env(&mut self, env: &Value) -> SimpipeResult<()> {
        self.call(&json!({"op": "make_env", "config": env}))
            .map(|_| ())
    }

    /// Invoke the standalone entry point and wait the backend out.
    ///
    /// The backend owns its frame cadence and output channel in this mode; a
    /// clean child exit is a complete, successful run.
    pub fn run_main(&mut self) -> SimpipeResult<i32> {
        self.call(&json!({"op": "main"}))?;
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| SimpipeError::backend(format!("wait for backend: {e}")))?;
        if !status.success() {
            return Err(SimpipeError::backend(format!(
                "standalone backend exited with status {status}"
            )));
        }
        Ok(0)
    }

    /// Reset the environment using the negotiated form. Total failure is
    /// tolerated and yields no observation.
    pub fn reset(&mut self) -> Option<Value> {
        let request = match self.caps.reset {
            Some(ResetForm::Nullary) => json!({"op": "reset"}),
            Some(ResetForm::NullArg) => json!({"op": "reset", "arg": null}),
            None => return None,
        };
        self.call(&request)
            .ok()
            .and_then(|mut reply| reply.get_mut("observation").map(Value::take))
            .filter(|obs| !obs.is_null())
    }

    /// Sample one action from the backend's action space, zeroed where
    /// numeric. Sampling failure yields no action.
    pub fn sample_action(&mut self) -> Option<Value> {
        if !self.caps.action_space {
            return None;
        }
        let mut reply = self.call(&json!({"op": "sample_action"})).ok()?;
        let sample = reply.get_mut("action").map(Value::take)?;
        Some(zero_action(sample))
    }

    /// Advance the simulation using the negotiated step form. Step failure is
    /// tolerated; the subsequent render decides whether the tick produced a
    /// frame.
    pub fn step(&mut self, action: &Value) {
        let request = match self.caps.step {
            Some(StepForm::Action) => json!({"op": "step", "action": action}),
            Some(StepForm::ActionWithContext) => {
                json!({"op": "step", "action": action, "context": {}})
            }
            None => return,
        };
        let _ = self.call(&request);
    }

    /// Ask for one frame payload. Any failure or empty reply yields nothing.
    pub fn render(&mut self) -> Option<Value> {
        if !self.caps.render {
            return None;
        }
        let mut reply = self.call(&json!({"op": "render"})).ok()?;
        reply
            .get_mut("frame")
            .map(Value::take)
            .filter(|frame| !frame.is_null())
    }

    /// Best-effort shutdown: issue `close`, then reap the child
    /// unconditionally so a wedged backend cannot stall our own exit.
    pub fn close(mut self) {
        let _ = self.call(&json!({"op": "close"}));
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Zero out an action sample where it is numeric; anything non-numeric is
/// kept as sampled.
pub fn zero_action(value: Value) -> Value {
    match value {
        Value::Number(_) => json!(0.0),
        Value::Array(items) => Value::Array(items.into_iter().map(zero_action).collect()),
        other => other,
    }
}
