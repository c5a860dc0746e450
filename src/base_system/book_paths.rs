//! 书籍工作目录内的文件命名约定。
//!
//! 目录布局：
//! - `part01.mp3`、`part02.mp3` …：按序号补零的分段文件
//! - `part01.mp3.tmp`：下载中的临时文件，扫描时忽略
//! - `status.json`：续传记录
//! - `chapters.json` / `cover.jpg`：完成后写出
//! - `bad`：放弃标记，存在时不再自动重试

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::base_system::context::{Config, safe_fs_name};

pub const STATUS_FILE: &str = "status.json";
pub const CHAPTERS_FILE: &str = "chapters.json";
pub const COVER_FILE: &str = "cover.jpg";
pub const BAD_MARKER: &str = "bad";

static RE_PART_FILE: OnceLock<Regex> = OnceLock::new();

fn re_part_file() -> &'static Regex {
    RE_PART_FILE.get_or_init(|| Regex::new(r"^part(\d+)\.mp3$").expect("compile RE_PART_FILE"))
}

pub fn book_folder_name(book_id: &str, book_name: Option<&str>) -> String {
    let safe_book_id = safe_fs_name(book_id, "_", 120);
    let safe_book_name = safe_fs_name(book_name.unwrap_or(book_id), "_", 120);
    format!("{}_{}", safe_book_id, safe_book_name)
}

pub fn book_folder_path(config: &Config, book_id: &str, book_name: Option<&str>) -> PathBuf {
    config
        .default_save_dir()
        .join(book_folder_name(book_id, book_name))
}

pub fn part_file_name(part_num: u32) -> String {
    format!("part{part_num:02}.mp3")
}

pub fn part_file_path(dir: &Path, part_num: u32) -> PathBuf {
    dir.join(part_file_name(part_num))
}

pub fn part_temp_path(dir: &Path, part_num: u32) -> PathBuf {
    dir.join(format!("{}.tmp", part_file_name(part_num)))
}

/// `part07.mp3` -> 7；其他文件名返回 None。
pub fn parse_part_file_name(name: &str) -> Option<u32> {
    re_part_file()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn status_path(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE)
}

pub fn chapters_path(dir: &Path) -> PathBuf {
    dir.join(CHAPTERS_FILE)
}

pub fn cover_path(dir: &Path) -> PathBuf {
    dir.join(COVER_FILE)
}

pub fn bad_marker_path(dir: &Path) -> PathBuf {
    dir.join(BAD_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_are_zero_padded() {
        assert_eq!(part_file_name(1), "part01.mp3");
        assert_eq!(part_file_name(12), "part12.mp3");
        assert_eq!(part_file_name(123), "part123.mp3");
    }

    #[test]
    fn parse_part_file_name_accepts_any_padding() {
        assert_eq!(parse_part_file_name("part01.mp3"), Some(1));
        assert_eq!(parse_part_file_name("part1.mp3"), Some(1));
        assert_eq!(parse_part_file_name("part120.mp3"), Some(120));
        assert_eq!(parse_part_file_name("part01.mp3.tmp"), None);
        assert_eq!(parse_part_file_name("cover.jpg"), None);
        assert_eq!(parse_part_file_name("Part01.mp3"), None);
    }

    #[test]
    fn book_folder_uses_id_and_sanitized_title() {
        let config = Config {
            save_path: "/downloads".to_string(),
            ..Config::default()
        };
        let path = book_folder_path(&config, "1234", Some("Dune: Messiah"));
        assert_eq!(path, PathBuf::from("/downloads").join("1234_Dune： Messiah"));
    }
}
