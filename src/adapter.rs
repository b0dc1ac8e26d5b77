use std::io::Write;

use image::DynamicImage;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{self, Backend};
use crate::clock::TickPacer;
use crate::config::{self, RunConfig};
use crate::emit::RawFrameSink;
use crate::error::SimpipeResult;
use crate::fallback;
use crate::normalize;
use crate::stop::StopToken;

/// Producer lifecycle. Every pre-loop failure routes through `Degrading`;
/// both strategies terminate in `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    Probing,
    Running,
    Degrading,
    Stopped,
}

/// Per-tick failure. Every variant is non-fatal to the production loop: the
/// tick emits nothing and the loop sleeps on.
#[derive(thiserror::Error, Debug)]
pub enum TickError {
    #[error("backend produced no frame this tick")]
    NoFrame,
    #[error("frame payload rejected during normalization")]
    Rejected,
}

/// Single entry point for the binary: try the external backend, degrade to
/// the built-in renderer on any pre-loop failure.
pub fn run<W: Write>(
    cfg: &RunConfig,
    stop: &StopToken,
    sink: &mut RawFrameSink<W>,
) -> SimpipeResult<i32> {
    Adapter::new().run(cfg, stop, sink)
}

enum Probed {
    /// Environment constructed; drive the step/render loop.
    Session {
        backend: Backend,
        action: Option<Value>,
    },
    /// No factory, but a standalone entry point exists.
    Standalone(Backend),
    Fallback,
}

/// Drives one run: probe the external backend, then produce frames until the
/// stop token is set, degrading to [`fallback`] when the backend cannot be
/// used.
#[derive(Debug, Default)]
pub struct Adapter {
    state: Option<AdapterState>,
}

impl Adapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state; `None` before the first run.
    pub fn state(&self) -> Option<AdapterState> {
        self.state
    }

    pub fn run<W: Write>(
        &mut self,
        cfg: &RunConfig,
        stop: &StopToken,
        sink: &mut RawFrameSink<W>,
    ) -> SimpipeResult<i32> {
        self.run_with(&backend::BACKEND_PROGRAMS, cfg, stop, sink)
    }

    /// [`Adapter::run`] with injectable backend candidates.
    pub fn run_with<W: Write>(
        &mut self,
        candidates: &[&str],
        cfg: &RunConfig,
        stop: &StopToken,
        sink: &mut RawFrameSink<W>,
    ) -> SimpipeResult<i32> {
        self.state = Some(AdapterState::Probing);
        let outcome = match probe(candidates, cfg) {
            Probed::Session {
                mut backend,
                action,
            } => {
                self.state = Some(AdapterState::Running);
                debug!("backend environment ready; entering production loop");
                let result = drive(&mut backend, action.as_ref(), cfg, stop, sink);
                backend.close();
                result
            }
            Probed::Standalone(mut backend) => match backend.run_main() {
                Ok(code) => Ok(code),
                Err(e) => {
                    warn!("standalone backend entry failed: {e}");
                    backend.close();
                    self.degrade(cfg, stop, sink)
                }
            },
            Probed::Fallback => self.degrade(cfg, stop, sink),
        };
        self.state = Some(AdapterState::Stopped);
        outcome
    }

    fn degrade<W: Write>(
        &mut self,
        cfg: &RunConfig,
        stop: &StopToken,
        sink: &mut RawFrameSink<W>,
    ) -> SimpipeResult<i32> {
        self.state = Some(AdapterState::Degrading);
        fallback::run(cfg, stop, sink)
    }
}

/// Run every recoverable construction stage. Each failure lands one line on
/// the diagnostic stream and resolves to `Probed::Fallback`.
fn probe(candidates: &[&str], cfg: &RunConfig) -> Probed {
    let Some(program) = backend::locate(candidates) else {
        warn!("simulation backend unavailable; falling back to the built-in renderer");
        return Probed::Fallback;
    };

    let mut backend = match Backend::spawn(&program) {
        Ok(backend) => backend,
        Err(e) => {
            warn!("backend startup failed: {e}");
            return Probed::Fallback;
        }
    };

    let Some(config_path) = config::discover_config(cfg.config_path.as_deref()) else {
        warn!(
            "{} not found; falling back to the built-in renderer",
            config::CONFIG_FILE_NAME
        );
        backend.close();
        return Probed::Fallback;
    };

    let text = match std::fs::read_to_string(&config_path) {
        Ok(text) => text,
        Err(e) => {
            warn!("read {}: {e}", config_path.display());
            backend.close();
            return Probed::Fallback;
        }
    };

    // Prefer the typed config model; fall back to heuristic key massaging for
    // legacy files.
    let payload = match config::structured_env_payload(&text)
        .or_else(|_| config::heuristic_env_payload(&text))
    {
        Ok(payload) => payload,
        Err(e) => {
            warn!("unusable {}: {e}", config_path.display());
            backend.close();
            return Probed::Fallback;
        }
    };

    let caps = backend.capabilities().clone();
    if caps.make_env {
        if let Err(e) = backend.make_env(&payload) {
            warn!("environment construction failed: {e}");
            backend.close();
            return Probed::Fallback;
        }
    } else if caps.main {
        return Probed::Standalone(backend);
    } else {
        warn!("backend exposes no environment factory; falling back to the built-in renderer");
        backend.close();
        return Probed::Fallback;
    }

    // Reset failure is tolerated: no observation, not fatal.
    let _observation = backend.reset();
    let action = backend.sample_action();

    Probed::Session { backend, action }
}

fn drive<W: Write>(
    backend: &mut Backend,
    action: Option<&Value>,
    cfg: &RunConfig,
    stop: &StopToken,
    sink: &mut RawFrameSink<W>,
) -> SimpipeResult<i32> {
    let mut pacer = TickPacer::new(cfg.fps);
    while !stop.is_set() {
        match tick(backend, action) {
            Ok(frame) => sink.emit(&frame)?,
            Err(err) => debug!("tick skipped: {err}"),
        }
        pacer.pace();
    }
    Ok(0)
}

/// Produce one frame: render first; when that yields nothing and an action is
/// prepared, step and render again.
fn tick(backend: &mut Backend, action: Option<&Value>) -> Result<DynamicImage, TickError> {
    let mut payload = backend.render();
    if payload.is_none()
        && let Some(action) = action
    {
        backend.step(action);
        payload = backend.render();
    }
    let payload = payload.ok_or(TickError::NoFrame)?;
    normalize::normalize(normalize::classify(payload)).ok_or(TickError::Rejected)
}
