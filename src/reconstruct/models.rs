//! 重建流程的数据模型。

use std::path::PathBuf;

use serde::Serialize;

use super::chapter_index::ChapterMark;

/// 一本书的运行期状态；`loaded_duration_sec` 只从磁盘上的分段重新测量得到。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookState {
    pub expected_duration_sec: u32,
    pub loaded_duration_sec: u32,
    pub next_part_num: u32,
}

impl BookState {
    /// 播放器时长读数按秒截断，差一秒即视为完整。
    pub fn is_complete(&self) -> bool {
        self.loaded_duration_sec.saturating_add(1) >= self.expected_duration_sec
    }
}

/// 二分区间 `[lower, upper]`（秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRange {
    pub lower: u32,
    pub upper: u32,
}

impl SearchRange {
    pub fn width(&self) -> u32 {
        self.upper.saturating_sub(self.lower)
    }

    pub fn is_collapsed(&self) -> bool {
        self.lower >= self.upper
    }

    /// 落在 `(lower, upper]` 内的位置收紧区间：离下界不超过 `fuzz` 秒时抬高下界，否则压低上界。
    pub fn narrow(&mut self, position: u32, fuzz: u32) -> bool {
        if position <= self.lower || position > self.upper {
            return false;
        }
        if position - self.lower <= fuzz {
            self.lower = position;
        } else {
            self.upper = position;
        }
        true
    }
}

/// `get_book` 的结果。
#[derive(Debug, Clone, Serialize)]
pub struct BookOutcome {
    pub parts: u32,
    pub loaded_duration_sec: u32,
    pub expected_duration_sec: u32,
    pub chapters: Vec<ChapterMark>,
    pub cover: Option<PathBuf>,
    /// 本次运行开始时的下一个分段号；1 表示全新下载
    pub resumed_from: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressSnapshot {
    pub loaded_sec: u32,
    pub expected_sec: u32,
    pub parts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_moves_upper_outside_fuzz_window() {
        let mut range = SearchRange {
            lower: 600,
            upper: 7200,
        };
        assert!(range.narrow(3900, 15));
        assert_eq!(range, SearchRange { lower: 600, upper: 3900 });
    }

    #[test]
    fn narrow_lifts_lower_inside_fuzz_window() {
        let mut range = SearchRange {
            lower: 600,
            upper: 7200,
        };
        assert!(range.narrow(615, 15));
        assert_eq!(range.lower, 615);
        assert_eq!(range.upper, 7200);
    }

    #[test]
    fn narrow_ignores_positions_outside_range() {
        let mut range = SearchRange {
            lower: 600,
            upper: 900,
        };
        assert!(!range.narrow(600, 15));
        assert!(!range.narrow(901, 15));
        assert!(range.narrow(900, 15));
        assert_eq!(range.upper, 900);
    }

    #[test]
    fn state_is_complete_within_one_second() {
        let mut state = BookState {
            expected_duration_sec: 3600,
            loaded_duration_sec: 3598,
            next_part_num: 4,
        };
        assert!(!state.is_complete());
        state.loaded_duration_sec = 3599;
        assert!(state.is_complete());
    }
}
