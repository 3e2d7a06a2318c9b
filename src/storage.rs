use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::core::occurrence::{self, OccurrenceKey};
use crate::core::task::Task;

/// On-disk layout of the local state file:
/// `{tasks, settings, completionMap, selectedItems}` with the completion set
/// flattened to composite string keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub tasks: Vec<Task>,
    pub settings: Settings,
    #[serde(with = "occurrence::flat_map")]
    pub completion_map: BTreeSet<OccurrenceKey>,
    pub selected_items: Vec<Uuid>,
}

/// Load state from `path`. A missing file is a fresh start; an unreadable or
/// corrupt one is too, with the reason logged; never a panic.
pub fn load(path: &Path) -> PersistedState {
    if !path.exists() {
        return PersistedState::default();
    }
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                log::error!("Corrupt state file {}, starting fresh: {}", path.display(), e);
                PersistedState::default()
            }
        },
        Err(e) => {
            log::error!("Failed to read {}, starting fresh: {}", path.display(), e);
            PersistedState::default()
        }
    }
}

/// Save state to `path` using atomic write (temp file + rename).
pub fn save(path: &Path, state: &PersistedState) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;
    let mut f = File::create(&tmp)?;
    f.write_all(data.as_bytes())?;
    f.flush()?;
    fs::rename(tmp, path)?;
    Ok(())
}
