//! 测试用下载器：分段文件里只写入时长文本，由 `FakeProbe` 读回。

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::Path;

use super::{DurationProbe, PartFetcher};
use crate::base_system::book_paths::part_file_path;
use crate::session::fake::FakeBook;
use crate::session::request_log::part_number;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FakeProbe;

impl DurationProbe for FakeProbe {
    fn measure(&self, path: &Path) -> io::Result<f64> {
        fs::read_to_string(path)?
            .trim()
            .parse::<f64>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// 记录测量次数的 `FakeProbe`。
#[derive(Debug, Default)]
pub(crate) struct CountingProbe {
    pub calls: Cell<u32>,
}

impl DurationProbe for CountingProbe {
    fn measure(&self, path: &Path) -> io::Result<f64> {
        self.calls.set(self.calls.get() + 1);
        FakeProbe.measure(path)
    }
}

pub(crate) fn write_part(dir: &Path, part_num: u32, secs: f64) {
    fs::create_dir_all(dir).expect("create book dir");
    fs::write(part_file_path(dir, part_num), secs.to_string()).expect("write part");
}

#[derive(Debug)]
pub(crate) struct FakeFetcher {
    book: FakeBook,
    pub fail_on: Option<u32>,
    pub fetched: Vec<u32>,
    pub covers: u32,
}

impl FakeFetcher {
    pub fn new(book: FakeBook) -> Self {
        Self {
            book,
            fail_on: None,
            fetched: Vec::new(),
            covers: 0,
        }
    }
}

impl PartFetcher for FakeFetcher {
    fn fetch_part(&mut self, url: &str, dest_dir: &Path, part_num: u32) -> u32 {
        assert_eq!(part_number(url), Some(part_num), "url does not match part");
        if self.fail_on == Some(part_num) {
            return 0;
        }
        let secs = self.book.part_len(part_num);
        write_part(dest_dir, part_num, f64::from(secs));
        self.fetched.push(part_num);
        secs
    }

    fn fetch_cover(&mut self, _url: &str, dest: &Path) -> bool {
        self.covers += 1;
        fs::write(dest, b"\xFF\xD8\xFF").is_ok()
    }
}
