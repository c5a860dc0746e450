//! `status.json` 与放弃标记 `bad` 的读写。

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::error::ReconstructError;
use crate::base_system::book_paths::{bad_marker_path, status_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStatus {
    pub expected_duration_sec: u32,
    pub loaded_duration_sec: u32,
    pub next_part_num: u32,
    #[serde(default)]
    pub updated_at: String,
}

impl BookStatus {
    pub fn new(expected_duration_sec: u32, loaded_duration_sec: u32, next_part_num: u32) -> Self {
        Self {
            expected_duration_sec,
            loaded_duration_sec,
            next_part_num,
            updated_at: now_rfc3339(),
        }
    }

    pub fn load(dir: &Path) -> Result<Option<Self>, ReconstructError> {
        let path = status_path(dir);
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ReconstructError::io(path, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ReconstructError::corrupt(dir, format!("unreadable status.json: {e}")))
    }

    /// 先写临时文件再改名。
    pub fn save(&self, dir: &Path) -> Result<(), ReconstructError> {
        let path = status_path(dir);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| ReconstructError::io(&path, e.into()))?;
        fs::write(&tmp, body).map_err(|e| ReconstructError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ReconstructError::io(&path, e))
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub fn is_poisoned(dir: &Path) -> bool {
    bad_marker_path(dir).exists()
}

pub fn mark_poisoned(dir: &Path, reason: &str) -> Result<(), ReconstructError> {
    let path = bad_marker_path(dir);
    fs::create_dir_all(dir).map_err(|e| ReconstructError::io(dir, e))?;
    fs::write(&path, format!("{reason}\n")).map_err(|e| ReconstructError::io(path, e))
}

/// 返回是否确实删除了标记。
pub fn clear_poisoned(dir: &Path) -> Result<bool, ReconstructError> {
    let path = bad_marker_path(dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReconstructError::io(path, e)),
    }
}
