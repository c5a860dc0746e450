//! 分段音频与封面下载。
//!
//! - `http`  — 基于 reqwest 的阻塞下载实现
//! - `probe` — 从 MP3 文件头推算时长

pub mod http;
pub mod probe;

#[cfg(test)]
pub(crate) mod fake;

use std::io;
use std::path::Path;

/// 下载分段并返回其时长（秒）；0 表示失败，调用方负责把它当作致命错误。
pub trait PartFetcher {
    fn fetch_part(&mut self, url: &str, dest_dir: &Path, part_num: u32) -> u32;
    fn fetch_cover(&mut self, url: &str, dest: &Path) -> bool;
}

/// 测量已落盘音频的时长。
pub trait DurationProbe {
    fn measure(&self, path: &Path) -> io::Result<f64>;
}
