//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rtvoice_settings::VoiceSettings;
use serde_json::Value;

/// Realtime voice session client.
#[derive(Parser, Debug)]
#[command(name = "rtvoice", version, about = "Realtime voice session client")]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a voice session until Ctrl-C.
    Run(RunArgs),
    /// Print the effective settings as JSON.
    Settings(SettingsArgs),
}

/// `rtvoice run` options. Each one overrides the settings file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Realtime model.
    #[arg(long)]
    pub model: Option<String>,

    /// Output voice.
    #[arg(long)]
    pub voice: Option<String>,

    /// Token count that triggers context summarization.
    #[arg(long)]
    pub summary_threshold: Option<u64>,

    /// Raw PCM16 input file (`-` for stdin).
    #[arg(long)]
    pub input: Option<String>,

    /// Raw PCM16 output file (`-` for stdout).
    #[arg(long)]
    pub output: Option<String>,

    /// Settings file (default `~/.rtvoice/settings.json`).
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Print the effective settings to stderr and log at debug level.
    #[arg(long, short)]
    pub verbose: bool,
}

/// `rtvoice settings` options.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Settings file (default `~/.rtvoice/settings.json`).
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl RunArgs {
    /// Apply the flags on top of loaded settings.
    pub fn apply(&self, settings: &mut VoiceSettings) {
        if let Some(model) = &self.model {
            settings.api.realtime_model.clone_from(model);
        }
        if let Some(voice) = &self.voice {
            settings.api.voice.clone_from(voice);
        }
        if let Some(threshold) = self.summary_threshold {
            settings.summary.trigger_tokens = threshold;
        }
        if let Some(input) = &self.input {
            settings.audio.input_path = path_arg(input);
        }
        if let Some(output) = &self.output {
            settings.audio.output_path = path_arg(output);
        }
        if self.verbose {
            settings.logging.level = "debug".to_string();
        }
    }
}

/// `-` selects the standard stream.
fn path_arg(raw: &str) -> Option<String> {
    (raw != "-").then(|| raw.to_string())
}

/// Settings as JSON with API keys masked.
pub fn masked_settings(settings: &VoiceSettings) -> Value {
    let mut value = serde_json::to_value(settings).unwrap_or(Value::Null);
    if let Some(api) = value.get_mut("api").and_then(Value::as_object_mut) {
        for key in ["apiKey", "azureApiKey"] {
            if let Some(secret) = api.get_mut(key)
                && secret.as_str().is_some_and(|s| !s.is_empty())
            {
                *secret = Value::String("***".to_string());
            }
        }
    }
    value
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
