use std::fs;
use std::path::Path;

use engine_logging::{engine_error, engine_info, engine_warn};
use portal_core::JobOutcome;
use portal_engine::AtomicFileWriter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const STATE_FILENAME: &str = ".portal_state.ron";

/// Payload is kept as JSON text; RON cannot carry arbitrary JSON values faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedOutcome {
    kind: String,
    finished_utc: String,
    payload_json: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LastOutcome {
    pub kind: String,
    pub finished_utc: String,
    pub payload: Value,
}

pub(crate) fn load_last_outcome(state_dir: &Path) -> Option<LastOutcome> {
    let path = state_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            engine_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return None;
        }
    };

    let persisted: PersistedOutcome = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            engine_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            return None;
        }
    };
    let payload = match serde_json::from_str(&persisted.payload_json) {
        Ok(payload) => payload,
        Err(err) => {
            engine_warn!("Persisted result in {:?} is not valid JSON: {}", path, err);
            return None;
        }
    };

    engine_info!("Loaded last result from {:?}", path);
    Some(LastOutcome {
        kind: persisted.kind,
        finished_utc: persisted.finished_utc,
        payload,
    })
}

pub(crate) fn save_last_outcome(state_dir: &Path, outcome: &JobOutcome, finished_utc: String) {
    let payload_json = match serde_json::to_string(outcome.payload()) {
        Ok(json) => json,
        Err(err) => {
            engine_error!("Failed to encode result payload: {}", err);
            return;
        }
    };
    let state = PersistedOutcome {
        kind: outcome.kind().to_string(),
        finished_utc,
        payload_json,
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            engine_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    if let Err(err) = AtomicFileWriter::new(state_dir).write(STATE_FILENAME, &content) {
        engine_error!("Failed to write persisted state to {:?}: {}", state_dir, err);
    }
}
