use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionError;

/// 单本书的致命错误；任何一种都只终止当前这本书。
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("chapter structure is inconsistent: {0}")]
    Structure(String),

    #[error("working directory {dir} is not resumable: {reason}; clean it up manually")]
    CorruptState { dir: PathBuf, reason: String },

    #[error(
        "could not locate part {part} (range {lower}s..{upper}s, chapter {chapter}) before the search stalled"
    )]
    SearchExhausted {
        part: u32,
        lower: u32,
        upper: u32,
        chapter: usize,
    },

    #[error("download of part {part} failed: {url}")]
    FetchFailed { part: u32, url: String },

    #[error("book directory is marked bad ({marker}); delete the marker to retry")]
    Poisoned { marker: PathBuf },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ReconstructError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ReconstructError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReconstructError::CorruptState {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    /// 直接重跑大概率会以同样方式失败的错误，应当给目录打上放弃标记。
    pub fn should_poison(&self) -> bool {
        matches!(
            self,
            ReconstructError::SearchExhausted { .. } | ReconstructError::Structure(_)
        )
    }
}
