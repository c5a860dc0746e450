//! 章节起点索引：按起点严格递增，末尾附加一个等于全书时长的哨兵。

use serde::{Deserialize, Serialize};

use super::error::ReconstructError;
use crate::base_system::time_fmt::to_seconds;
use crate::session::player::TocListing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMark {
    pub index: usize,
    pub title: Option<String>,
    pub start_sec: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterIndex {
    /// 最后一项是哨兵（title 为 None，start_sec 为全书时长）
    marks: Vec<ChapterMark>,
}

impl ChapterIndex {
    /// 没有目录时的单章节。
    pub fn single(expected_duration: u32) -> Self {
        Self {
            marks: vec![
                ChapterMark {
                    index: 0,
                    title: None,
                    start_sec: 0,
                },
                ChapterMark {
                    index: 1,
                    title: None,
                    start_sec: expected_duration,
                },
            ],
        }
    }

    pub fn from_entries(
        entries: &[(String, u32)],
        expected_duration: u32,
    ) -> Result<Self, ReconstructError> {
        if entries.is_empty() {
            return Ok(Self::single(expected_duration));
        }

        for pair in entries.windows(2) {
            let ((prev_title, prev), (title, start)) = (&pair[0], &pair[1]);
            if start <= prev {
                return Err(ReconstructError::Structure(format!(
                    "chapter {title:?} starts at {start}s, not after {prev_title:?} at {prev}s"
                )));
            }
        }
        let (last_title, last_start) = &entries[entries.len() - 1];
        if *last_start >= expected_duration {
            return Err(ReconstructError::Structure(format!(
                "chapter {last_title:?} starts at {last_start}s, past the book end {expected_duration}s"
            )));
        }

        let mut marks: Vec<ChapterMark> = entries
            .iter()
            .enumerate()
            .map(|(index, (title, start))| ChapterMark {
                index,
                title: Some(title.clone()).filter(|t| !t.is_empty()),
                start_sec: *start,
            })
            .collect();
        marks.push(ChapterMark {
            index: entries.len(),
            title: None,
            start_sec: expected_duration,
        });
        Ok(Self { marks })
    }

    /// 由目录弹窗的原始读数构建。
    pub fn from_toc(toc: &TocListing, expected_duration: u32) -> Result<Self, ReconstructError> {
        if toc.titles.len() != toc.offsets.len() {
            return Err(ReconstructError::Structure(format!(
                "table of contents lists {} titles but {} offsets",
                toc.titles.len(),
                toc.offsets.len()
            )));
        }
        let mut entries = Vec::with_capacity(toc.titles.len());
        for (title, offset) in toc.titles.iter().zip(&toc.offsets) {
            let start = to_seconds(offset).map_err(|e| {
                ReconstructError::Structure(format!("chapter {title:?}: {e}"))
            })?;
            entries.push((title.clone(), start));
        }
        Self::from_entries(&entries, expected_duration)
    }

    /// 各章起点加哨兵。
    pub fn chapter_seconds(&self) -> Vec<u32> {
        self.marks.iter().map(|m| m.start_sec).collect()
    }

    /// 不含哨兵的章节列表。
    pub fn marks(&self) -> &[ChapterMark] {
        &self.marks[..self.marks.len() - 1]
    }

    pub fn real_len(&self) -> usize {
        self.marks.len() - 1
    }

    pub fn total(&self) -> u32 {
        self.marks[self.marks.len() - 1].start_sec
    }

    /// 第 `index` 章起点；越界时返回全书时长。
    pub fn start(&self, index: usize) -> u32 {
        self.marks
            .get(index)
            .map(|m| m.start_sec)
            .unwrap_or_else(|| self.total())
    }

    pub fn end_of(&self, index: usize) -> u32 {
        self.start(index.saturating_add(1))
    }

    /// 满足 `start(i) <= t < start(i+1)` 的 `i`；哨兵永远不“包含”任何时间点。
    pub fn containing(&self, t: u32) -> usize {
        let real = self.real_len();
        let after = self.marks[..real].partition_point(|m| m.start_sec <= t);
        after.saturating_sub(1)
    }
}
