//! 分段 → 章节映射：逐章遍历播放器，记录每章首次出现的分段，再反转成
//! “分段 p 的起点不晚于第 `chapter_for(p)` 章结束”。

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use super::chapter_index::ChapterIndex;
use super::error::ReconstructError;
use crate::session::player::{Player, SkipStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartChapterMap {
    /// 下标 `p - 1` 对应分段 `p`，单调不减
    chapters: Vec<usize>,
    /// 遍历之后才出现或从未出现的分段所在的虚拟章节
    past_end: usize,
}

/// 由“章节 → 该章首次出现的分段”反转为逐分段的章节表。
///
/// 两个已知分段之间缺失的分段取后一个已知分段的前一章（不低于前一个分段），
/// 超过最大已知分段的部分记为 `max_chapter + 1`。
pub fn invert(chapter_to_part: &BTreeMap<usize, u32>, max_part: u32) -> Vec<usize> {
    let known: BTreeMap<u32, usize> = chapter_to_part
        .iter()
        .map(|(chapter, part)| (*part, *chapter))
        .collect();
    let past_end = chapter_to_part.keys().next_back().map_or(0, |c| c + 1);

    let mut out: Vec<usize> = Vec::with_capacity(max_part as usize);
    for part in 1..=max_part {
        let prev = out.last().copied().unwrap_or(0);
        let chapter = match known.get(&part) {
            Some(c) => *c,
            None => match known.range(part + 1..).next() {
                Some((_, next_c)) => prev.max(next_c.saturating_sub(1)),
                None => past_end,
            },
        };
        out.push(chapter);
    }
    // 请求日志的顺序不可靠时，向前取最小值保证单调
    for i in (0..out.len().saturating_sub(1)).rev() {
        out[i] = out[i].min(out[i + 1]);
    }
    out
}

impl PartChapterMap {
    pub fn from_observations(chapter_to_part: &BTreeMap<usize, u32>, max_part: u32) -> Self {
        let mut first_parts = chapter_to_part.clone();
        first_parts.insert(0, 1);
        let max_part = max_part.max(1);
        Self {
            chapters: invert(&first_parts, max_part),
            past_end: first_parts.keys().next_back().map_or(1, |c| c + 1),
        }
    }

    /// 分段 `part` 的章节上界；未知分段落在虚拟的末尾章节。
    pub fn chapter_for(&self, part: u32) -> usize {
        if part == 0 {
            return 0;
        }
        self.chapters
            .get(part as usize - 1)
            .copied()
            .unwrap_or(self.past_end)
    }

    pub fn max_part(&self) -> u32 {
        self.chapters.len() as u32
    }

    pub fn past_end(&self) -> usize {
        self.past_end
    }

    /// 每章第一个被映射到的分段，不含虚拟末尾章节。
    pub fn chapter_to_part(&self) -> BTreeMap<usize, u32> {
        let mut out = BTreeMap::new();
        for (idx, chapter) in self.chapters.iter().enumerate() {
            if *chapter < self.past_end {
                out.entry(*chapter).or_insert(idx as u32 + 1);
            }
        }
        out
    }

    /// 定位到分段后收紧上界；更早的分段一并收紧以保持单调。
    pub fn tighten(&mut self, part: u32, chapter: usize) {
        if part == 0 {
            return;
        }
        let idx = part as usize - 1;
        if idx >= self.chapters.len() {
            self.chapters.resize(idx + 1, self.past_end);
        }
        for c in &mut self.chapters[..=idx] {
            if *c > chapter {
                *c = chapter;
            }
        }
    }
}

fn visible_parts(player: &mut Player<'_>) -> Result<BTreeSet<u32>, ReconstructError> {
    Ok(player
        .part_records()?
        .into_iter()
        .map(|r| r.part_num)
        .collect())
}

/// 播放器只有在播放头附近才会预取分段，左右轻推几下让请求发出去。
fn nudge(player: &mut Player<'_>) -> Result<(), ReconstructError> {
    let (back, forward) = (player.config().walk_nudge_back, player.config().walk_nudge_forward);
    for _ in 0..back {
        player.skip(SkipStep::Fine, false)?;
    }
    for _ in 0..forward {
        player.skip(SkipStep::Fine, true)?;
    }
    Ok(())
}

/// 从第一章开始逐章前进，构建分段 → 章节映射。
pub fn walk(
    player: &mut Player<'_>,
    chapters: &ChapterIndex,
) -> Result<PartChapterMap, ReconstructError> {
    player.rewind_to_start()?;
    let mut seen = visible_parts(player)?;
    let mut chapter_to_part = BTreeMap::new();
    // 同一章里除第一个之外的新分段，反转后再逐个收紧
    let mut extra: Vec<(u32, usize)> = Vec::new();

    for chapter in 1..chapters.real_len() {
        if !player.can_go_next()? {
            warn!(target: "walk", chapter, total = chapters.real_len(), "下一章按钮提前失效");
            break;
        }
        player.next_chapter()?;
        nudge(player)?;

        let now = visible_parts(player)?;
        let fresh: Vec<u32> = now.difference(&seen).copied().collect();
        if let Some((first, rest)) = fresh.split_first() {
            chapter_to_part.entry(chapter).or_insert(*first);
            extra.extend(rest.iter().map(|p| (*p, chapter)));
            debug!(target: "walk", chapter, parts = ?fresh, "章节出现新分段");
        }
        seen = now;
    }

    if player.can_go_next()? {
        warn!(target: "walk", "遍历完所有章节后下一章按钮仍可用，继续向后扫描");
        let mut last = player.position()?;
        for _ in 0..player.config().trailing_sweep_presses {
            player.skip(SkipStep::Coarse, true)?;
            let pos = player.position()?;
            if pos == last {
                break;
            }
            last = pos;
        }
        let trailing: Vec<u32> = visible_parts(player)?.difference(&seen).copied().collect();
        if !trailing.is_empty() {
            warn!(target: "walk", parts = ?trailing, "末尾扫描发现额外分段");
        }
        seen.extend(trailing);
    }

    let max_part = seen.iter().next_back().copied().unwrap_or(1);
    let mut map = PartChapterMap::from_observations(&chapter_to_part, max_part);
    for (part, chapter) in extra {
        map.tighten(part, chapter);
    }
    info!(
        target: "walk",
        chapters = chapters.real_len(),
        parts = map.max_part(),
        "分段映射已建立"
    );
    Ok(map)
}
