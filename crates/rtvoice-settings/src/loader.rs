//! Settings loading: defaults, then the JSON file deep-merged on top, then
//! environment overrides, then [`VoiceSettings::validate`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::{LanguagePolicy, VoiceSettings};

/// Default settings file: `~/.rtvoice/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".rtvoice").join("settings.json")
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Load from the default path with process environment overrides.
pub fn load_settings() -> Result<VoiceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with process environment overrides.
pub fn load_settings_from_path(path: &Path) -> Result<VoiceSettings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Load from `path`, resolving environment variables through `env`.
///
/// A missing file yields defaults.
pub fn load_settings_with_env<F>(path: &Path, env: F) -> Result<VoiceSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(VoiceSettings::default())?;
    let merged = match std::fs::read_to_string(path) {
        Ok(raw) => {
            let user: Value = serde_json::from_str(&raw)?;
            tracing::debug!(?path, "loaded settings file");
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => defaults,
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let mut settings: VoiceSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate();
    Ok(settings)
}

/// Apply `OPENAI_API_KEY`, `RTVOICE_*`, `LOG_LEVEL` and `LOG_FORMAT`.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut VoiceSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("OPENAI_API_KEY") {
        settings.api.api_key = key;
    }
    if let Some(key) = get("RTVOICE_API_KEY") {
        settings.api.api_key = key;
    }
    if let Some(model) = get("RTVOICE_MODEL") {
        settings.api.realtime_model = model;
    }
    if let Some(voice) = get("RTVOICE_VOICE") {
        settings.api.voice = voice;
    }
    if let Some(raw) = get("RTVOICE_SUMMARY_TRIGGER") {
        match raw.trim().parse() {
            Ok(v) => settings.summary.trigger_tokens = v,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid RTVOICE_SUMMARY_TRIGGER"),
        }
    }
    if let Some(raw) = get("RTVOICE_KEEP_LAST_TURNS") {
        match raw.trim().parse() {
            Ok(v) => settings.summary.keep_last_turns = v,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid RTVOICE_KEEP_LAST_TURNS"),
        }
    }
    if let Some(raw) = get("RTVOICE_LANGUAGE_POLICY") {
        match LanguagePolicy::parse(raw.trim()) {
            Some(p) => settings.summary.language_policy = p,
            None => tracing::warn!(value = %raw, "ignoring invalid RTVOICE_LANGUAGE_POLICY"),
        }
    }
    if let Some(level) = get("LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(format) = get("LOG_FORMAT") {
        settings.logging.format = format;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn deep_merge_nested_objects() {
        let base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let overlay = serde_json::json!({"a": {"y": 20}, "c": 4});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, serde_json::json!({"a": {"x": 1, "y": 20}, "b": 3, "c": 4}));
    }

    #[test]
    fn deep_merge_replaces_non_objects() {
        let merged = deep_merge(serde_json::json!({"a": [1, 2]}), serde_json::json!({"a": [3]}));
        assert_eq!(merged["a"], serde_json::json!([3]));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_with_env(&dir.path().join("nope.json"), no_env).unwrap();
        assert_eq!(s.api.voice, "shimmer");
    }

    #[test]
    fn file_overrides_are_deep_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"transport": {"pingIntervalMs": 0}}"#).unwrap();
        let s = load_settings_with_env(&path, no_env).unwrap();
        assert_eq!(s.transport.ping_interval_ms, 0);
        assert_eq!(s.transport.backoff_base_ms, 500);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert_matches!(load_settings_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"api": {"voice": "alloy"}, "summary": {"triggerTokens": 10}}"#)
            .unwrap();
        let env = env_from(&[
            ("RTVOICE_VOICE", "verse"),
            ("RTVOICE_SUMMARY_TRIGGER", "5000"),
            ("RTVOICE_KEEP_LAST_TURNS", "4"),
            ("RTVOICE_LANGUAGE_POLICY", "force"),
            ("LOG_FORMAT", "json"),
        ]);
        let s = load_settings_with_env(&path, env).unwrap();
        assert_eq!(s.api.voice, "verse");
        assert_eq!(s.summary.trigger_tokens, 5000);
        assert_eq!(s.summary.keep_last_turns, 4);
        assert_eq!(s.summary.language_policy, LanguagePolicy::Force);
        assert_eq!(s.logging.format, "json");
    }

    #[test]
    fn rtvoice_key_beats_openai_key() {
        let mut s = VoiceSettings::default();
        apply_env_overrides(
            &mut s,
            env_from(&[("OPENAI_API_KEY", "sk-openai"), ("RTVOICE_API_KEY", "sk-rtvoice")]),
        );
        assert_eq!(s.api.api_key, "sk-rtvoice");

        let mut s = VoiceSettings::default();
        apply_env_overrides(&mut s, env_from(&[("OPENAI_API_KEY", "sk-openai")]));
        assert_eq!(s.api.api_key, "sk-openai");
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let mut s = VoiceSettings::default();
        apply_env_overrides(
            &mut s,
            env_from(&[("RTVOICE_SUMMARY_TRIGGER", "lots"), ("RTVOICE_KEEP_LAST_TURNS", "")]),
        );
        assert_eq!(s.summary.trigger_tokens, 2000);
        assert_eq!(s.summary.keep_last_turns, 2);
    }

    #[test]
    fn validation_runs_after_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"audio": {"sampleRateHz": 0}}"#).unwrap();
        let s = load_settings_with_env(&path, no_env).unwrap();
        assert_eq!(s.audio.sample_rate_hz, 24_000);
    }
}
