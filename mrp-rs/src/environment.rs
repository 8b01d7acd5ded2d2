use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EnvironmentError;

/// Inputs and output location of a single model run.
///
/// A run is described by an optional JSON document with an `input` object
/// (parameter overrides) and an `output` object (where artifacts go). With no
/// document at all the model runs on its built-in defaults.
pub struct Environment<I = ()> {
    input_json: serde_json::Map<String, Value>,
    pub input: Option<I>,
    output: Value,
}

impl Environment {
    pub fn from_json(data: Value) -> Self {
        let input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Self {
            input_json,
            input: None,
            output,
        }
    }

    /// Reads the run document from stdin. An interactive terminal or an empty
    /// stream means "no overrides".
    pub fn from_stdin() -> Result<Self, EnvironmentError> {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            tracing::debug!("stdin is a terminal, running with defaults");
            return Ok(Self::from_json(Value::Null));
        }
        let mut raw = String::new();
        stdin
            .lock()
            .read_to_string(&mut raw)
            .map_err(EnvironmentError::Stdin)?;
        Self::from_raw(&raw)
    }

    pub fn from_raw(raw: &str) -> Result<Self, EnvironmentError> {
        if raw.trim().is_empty() {
            return Ok(Self::from_json(Value::Null));
        }
        let data: Value = serde_json::from_str(raw)?;
        Ok(Self::from_json(data))
    }

    pub fn with_input_type<I: DeserializeOwned>(self) -> Result<Environment<I>, EnvironmentError> {
        let input_value = Value::Object(self.input_json.clone());
        let input = serde_json::from_value(input_value).map_err(EnvironmentError::Input)?;
        Ok(Environment {
            input_json: self.input_json,
            input: Some(input),
            output: self.output,
        })
    }
}

impl<I: DeserializeOwned> Environment<I> {
    pub fn load() -> Result<Self, EnvironmentError> {
        Environment::from_stdin()?.with_input_type::<I>()
    }
}

impl<I> Environment<I> {
    pub fn input_json(&self) -> &serde_json::Map<String, Value> {
        &self.input_json
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        // Flat output
        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return output
                .get("dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from);
        }

        // Profiled output, `default` first
        let profiles = output.get("profile").and_then(|v| v.as_object())?;
        let profile = profiles
            .get("default")
            .or_else(|| profiles.values().next())?;
        if profile.get("spec").and_then(|v| v.as_str()) != Some("filesystem") {
            return None;
        }
        profile.get("dir").and_then(|v| v.as_str()).map(PathBuf::from)
    }

    /// Writes `data` into the output directory, or the working directory when
    /// the run did not name one. Returns the path written.
    pub fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf, EnvironmentError> {
        let dir = self.output_dir().unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        let path = dir.join(filename);
        fs::write(&path, data).map_err(|source| io_error(&path, source))?;
        tracing::info!(path = %path.display(), bytes = data.len(), "wrote output");
        Ok(path)
    }
}

fn io_error(path: &Path, source: io::Error) -> EnvironmentError {
    EnvironmentError::Io {
        path: path.to_path_buf(),
        source,
    }
}
