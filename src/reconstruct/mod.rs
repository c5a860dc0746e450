//! 有声书重建引擎。
//!
//! 子模块：
//! - `chapter_index`  — 目录读数 → 带哨兵的章节起点表
//! - `part_map`       — 逐章遍历得到的分段 → 章节上界映射
//! - `locator`        — 在时间区间内二分定位未出现的分段
//! - `resumer`        — 断点续传校验
//! - `status`         — `status.json` 与放弃标记
//! - `reconstruction` — `get_book` 主循环
//! - `progress`       — 进度回调与终端进度条

pub mod chapter_index;
pub mod error;
pub mod locator;
pub mod models;
pub mod part_map;
mod progress;
pub mod reconstruction;
pub mod resumer;
pub mod status;

pub use chapter_index::{ChapterIndex, ChapterMark};
pub use error::ReconstructError;
pub use models::{BookOutcome, BookState, ProgressSnapshot, SearchRange};
pub use progress::ProgressCallback;
pub use reconstruction::{BookJob, Reconstructor};
