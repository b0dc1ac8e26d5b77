use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{SimpipeError, SimpipeResult};

pub const DEFAULT_FPS: u32 = 30;

/// File name looked up next to the executable and in the working directory.
pub const CONFIG_FILE_NAME: &str = "env-config.json";

/// Immutable per-run settings, supplied once at startup.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Frame production rate in ticks per second.
    pub fps: u32,
    /// Explicit config file override for the external backend.
    pub config_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            config_path: None,
        }
    }
}

/// Typed model of `env-config.json`.
///
/// This is the preferred construction path: a file that parses into this
/// model is forwarded to the backend factory in canonical form. Files that
/// predate the current key names fail here and go through
/// [`heuristic_env_payload`] instead.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SimConfig {
    pub env: EnvSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EnvSpec {
    /// Environment type identifier ("name" in legacy files).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Observation/action wrapper spec ("processor" in legacy files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<Value>,
    /// Backend-specific keys are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Build the factory payload through the typed [`SimConfig`] model.
pub fn structured_env_payload(text: &str) -> SimpipeResult<Value> {
    let cfg: SimConfig = serde_json::from_str(text)
        .map_err(|e| SimpipeError::validation(format!("parse {CONFIG_FILE_NAME}: {e}")))?;
    let mut env = serde_json::to_value(&cfg.env)
        .map_err(|e| SimpipeError::validation(format!("serialize env spec: {e}")))?;
    if let Some(device) = cfg.device
        && let Value::Object(map) = &mut env
    {
        map.insert("device".to_string(), Value::String(device));
    }
    Ok(env)
}

/// Build the factory payload by massaging the raw JSON document.
///
/// Selects the top-level `env` object when present (else the whole document),
/// maps `name` -> `type` and `processor` -> `wrapper` where the target key is
/// missing, and attaches the document-level `device` value.
pub fn heuristic_env_payload(text: &str) -> SimpipeResult<Value> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| SimpipeError::validation(format!("parse {CONFIG_FILE_NAME}: {e}")))?;
    let mut env = doc.get("env").cloned().unwrap_or_else(|| doc.clone());
    if let Value::Object(map) = &mut env {
        if !map.contains_key("type")
            && let Some(name) = map.get("name").cloned()
        {
            map.insert("type".to_string(), name);
        }
        if !map.contains_key("wrapper")
            && let Some(processor) = map.remove("processor")
        {
            map.insert("wrapper".to_string(), processor);
        }
        if let Some(device) = doc.get("device").cloned() {
            map.insert("device".to_string(), device);
        }
    }
    Ok(env)
}

/// Resolve the config file path.
///
/// Priority: explicit override, `env-config.json` next to the executable,
/// `env-config.json` in the current working directory. An override that does
/// not exist resolves to nothing rather than a broken path.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payload_keeps_extra_keys_and_device() {
        let text = r#"{
            "env": {"type": "sim_arm", "task": "reach", "robot": {"port": 1}},
            "device": "cpu"
        }"#;
        let payload = structured_env_payload(text).unwrap();
        assert_eq!(payload["type"], "sim_arm");
        assert_eq!(payload["task"], "reach");
        assert_eq!(payload["robot"]["port"], 1);
        assert_eq!(payload["device"], "cpu");
    }

    #[test]
    fn structured_payload_rejects_legacy_keys() {
        let text = r#"{"env": {"name": "sim_arm"}}"#;
        assert!(structured_env_payload(text).is_err());
    }

    #[test]
    fn heuristic_maps_name_to_type_when_missing() {
        let text = r#"{"env": {"name": "sim_arm"}}"#;
        let payload = heuristic_env_payload(text).unwrap();
        assert_eq!(payload["type"], "sim_arm");
        // The source key is kept.
        assert_eq!(payload["name"], "sim_arm");
    }

    #[test]
    fn heuristic_keeps_existing_type_and_wrapper() {
        let text = r#"{"env": {"type": "a", "name": "b", "wrapper": 1, "processor": 2}}"#;
        let payload = heuristic_env_payload(text).unwrap();
        assert_eq!(payload["type"], "a");
        assert_eq!(payload["wrapper"], 1);
        assert!(payload.get("processor").is_none());
    }

    #[test]
    fn heuristic_moves_processor_to_wrapper() {
        let text = r#"{"env": {"name": "x", "processor": {"crop": true}}}"#;
        let payload = heuristic_env_payload(text).unwrap();
        assert_eq!(payload["wrapper"]["crop"], true);
        assert!(payload.get("processor").is_none());
    }

    #[test]
    fn heuristic_attaches_top_level_device() {
        let text = r#"{"env": {"name": "x"}, "device": "cuda"}"#;
        let payload = heuristic_env_payload(text).unwrap();
        assert_eq!(payload["device"], "cuda");
    }

    #[test]
    fn heuristic_uses_whole_document_without_env_key() {
        let text = r#"{"name": "x"}"#;
        let payload = heuristic_env_payload(text).unwrap();
        assert_eq!(payload["type"], "x");
    }

    #[test]
    fn discover_honors_explicit_override() {
        let dir = PathBuf::from("target").join("config_discovery");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{}").unwrap();

        assert_eq!(discover_config(Some(&path)), Some(path.clone()));
        assert_eq!(discover_config(Some(&dir.join("missing.json"))), None);
    }
}
