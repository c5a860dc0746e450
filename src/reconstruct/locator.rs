//! 分段定位：在 `[lower, upper]` 内移动播放头，直到请求日志里出现目标分段。
//!
//! 每一轮依次尝试：停滞保护（连续播放兜底）、区间塌缩修复、按章节跳转二分、
//! 粗粒度快进快退、细粒度快进快退。每一轮要么找到分段，要么严格压低上界，
//! 要么触发停滞保护并结束搜索。

use std::time::Duration;

use tracing::{debug, info, warn};

use super::chapter_index::ChapterIndex;
use super::error::ReconstructError;
use super::models::SearchRange;
use super::part_map::PartChapterMap;
use crate::base_system::context::Config;
use crate::session::player::{Player, SkipStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub fuzz_secs: u32,
    pub clip_secs: u32,
    pub max_presses: u32,
    pub min_playback_secs: u32,
    pub poll_secs: u32,
}

impl SearchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fuzz_secs: config.fuzz_window_secs,
            clip_secs: config.search_clip_secs(),
            max_presses: config.max_skip_presses,
            min_playback_secs: config.min_playback_secs,
            poll_secs: config.playback_poll_secs.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    AlreadyVisible,
    ChapterJump,
    CoarseSkip,
    FineSkip,
    Playback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub part: u32,
    pub iterations: u32,
    pub via: Discovery,
    /// 发现分段时播放头的位置
    pub position: u32,
}

/// 初始区间：下界为已下载时长，上界取映射章节的结束位置，
/// 再裁剪到全书末尾以及下界之后 `clip_secs` 秒以内。
pub fn initial_range(
    chapters: &ChapterIndex,
    map: &PartChapterMap,
    part: u32,
    lower: u32,
    clip_secs: u32,
) -> SearchRange {
    let upper = chapters
        .end_of(map.chapter_for(part))
        .min(chapters.total())
        .min(lower.saturating_add(clip_secs));
    SearchRange { lower, upper }
}

pub struct PartLocator<'p, 'a> {
    player: &'p mut Player<'a>,
    chapters: &'p ChapterIndex,
    settings: SearchSettings,
}

impl<'p, 'a> PartLocator<'p, 'a> {
    pub fn new(
        player: &'p mut Player<'a>,
        chapters: &'p ChapterIndex,
        settings: SearchSettings,
    ) -> Self {
        Self {
            player,
            chapters,
            settings,
        }
    }

    pub fn locate(&mut self, part: u32, mut range: SearchRange) -> Result<Located, ReconstructError> {
        let position = self.player.position()?;
        if self.player.has_part(part)? {
            return Ok(Located {
                part,
                iterations: 0,
                via: Discovery::AlreadyVisible,
                position,
            });
        }

        let mut previous_upper: Option<u32> = None;
        let mut repaired = false;
        let mut iterations = 0;

        loop {
            iterations += 1;
            debug!(
                target: "locate",
                part,
                iterations,
                lower = range.lower,
                upper = range.upper,
                "搜索区间"
            );

            if previous_upper == Some(range.upper) {
                return self.play_through(part, range, iterations);
            }
            previous_upper = Some(range.upper);

            if range.is_collapsed() {
                if repaired {
                    return self.play_through(part, range, iterations);
                }
                repaired = true;
                warn!(
                    target: "locate",
                    part,
                    lower = range.lower,
                    upper = range.upper,
                    "搜索区间塌缩，上界重置为全书末尾"
                );
                range.upper = self.chapters.total();
                continue;
            }

            if let Some(position) = self.chapter_step(part, &mut range)? {
                return Ok(self.found(part, iterations, Discovery::ChapterJump, position));
            }
            if let Some(position) = self.skip_pass(part, &mut range, SkipStep::Coarse)? {
                return Ok(self.found(part, iterations, Discovery::CoarseSkip, position));
            }
            if let Some(position) = self.skip_pass(part, &mut range, SkipStep::Fine)? {
                return Ok(self.found(part, iterations, Discovery::FineSkip, position));
            }
        }
    }

    fn found(&self, part: u32, iterations: u32, via: Discovery, position: u32) -> Located {
        info!(target: "locate", part, iterations, ?via, position, "找到分段");
        Located {
            part,
            iterations,
            via,
            position,
        }
    }

    /// 跳到第 `target` 章；落点越过章节起点时再按一次“上一章”回到起点。
    fn go_to_chapter(&mut self, target: usize, current: usize) -> Result<u32, ReconstructError> {
        let start = self.chapters.start(target);
        if target == current {
            if self.player.position()? > start {
                self.player.previous_chapter()?;
            }
        } else {
            self.player.jump_to_chapter(target)?;
            if self.player.position()? > start {
                debug!(target: "locate", chapter = target, "跳转越过章节起点，回退一次");
                self.player.previous_chapter()?;
            }
        }
        Ok(self.player.position()?)
    }

    /// 在播放头所在章节与上界所在章节之间取中间章；相邻时在下界之后的第一章
    /// 和上界所在章节里挑离下界更近的一个，播放头本身更近则不跳。
    fn chapter_step(
        &mut self,
        part: u32,
        range: &mut SearchRange,
    ) -> Result<Option<u32>, ReconstructError> {
        let position = self.player.position()?;
        let current = self.chapters.containing(position);
        // 播放头退到下界以下时，从下界所在章节算起
        let from = current.max(self.chapters.containing(range.lower));
        let up = self.chapters.containing(range.upper);

        let target = if up > from + 1 {
            Some(from + (up - from) / 2)
        } else {
            let after_lower = self.chapters.containing(range.lower) + 1;
            let lower = range.lower;
            let upper = range.upper;
            let distance = |t: u32| t.abs_diff(lower);
            [after_lower, up]
                .into_iter()
                .filter(|c| *c < self.chapters.real_len())
                .map(|c| (c, self.chapters.start(c)))
                .filter(|(_, start)| *start > lower && *start <= upper)
                .min_by_key(|(c, start)| (distance(*start), *c))
                .filter(|(_, start)| distance(*start) < distance(position))
                .map(|(c, _)| c)
        };

        let Some(target) = target else {
            return Ok(None);
        };
        let landed = self.go_to_chapter(target, current)?;
        if self.player.has_part(part)? {
            return Ok(Some(landed));
        }
        range.narrow(landed, self.settings.fuzz_secs);
        Ok(None)
    }

    /// 先朝上界快进、再朝下界快退，每按一次都检查请求日志；
    /// 仅以最终位置收紧区间。
    fn skip_pass(
        &mut self,
        part: u32,
        range: &mut SearchRange,
        step: SkipStep,
    ) -> Result<Option<u32>, ReconstructError> {
        let secs = step.secs(self.player.config());
        let max = self.settings.max_presses;
        let mut position = self.player.position()?;

        for forward in [true, false] {
            let mut presses = 0;
            loop {
                let room = if forward {
                    position.saturating_add(secs) < range.upper
                } else {
                    position >= range.lower.saturating_add(secs)
                };
                if !room || presses >= max {
                    break;
                }
                self.player.skip(step, forward)?;
                presses += 1;
                let next = self.player.position()?;
                if self.player.has_part(part)? {
                    return Ok(Some(next));
                }
                if next == position {
                    break;
                }
                position = next;
            }
        }

        range.narrow(position, self.settings.fuzz_secs);
        Ok(None)
    }

    /// 停滞兜底：从下界所在章节开始连续播放，轮询请求日志。
    fn play_through(
        &mut self,
        part: u32,
        range: SearchRange,
        iterations: u32,
    ) -> Result<Located, ReconstructError> {
        let chapter = self.chapters.containing(range.lower);
        let start = self.chapters.start(chapter);
        let position = self.player.position()?;
        if position < start || position > range.lower.saturating_add(self.settings.fuzz_secs) {
            let current = self.chapters.containing(position);
            self.go_to_chapter(chapter, current)?;
        }

        let budget = range.width().max(self.settings.min_playback_secs);
        info!(target: "locate", part, budget, "区间不再收缩，改为连续播放");

        let poll = self.settings.poll_secs;
        self.player.toggle_playback()?;
        let mut elapsed = 0;
        let mut hit = None;
        while elapsed < budget {
            self.player.wait(Duration::from_secs(u64::from(poll)));
            elapsed += poll;
            if self.player.has_part(part)? {
                hit = Some(self.player.position()?);
                break;
            }
        }
        self.player.toggle_playback()?;

        match hit {
            Some(position) => Ok(self.found(part, iterations, Discovery::Playback, position)),
            None => Err(ReconstructError::SearchExhausted {
                part,
                lower: range.lower,
                upper: range.upper,
                chapter,
            }),
        }
    }
}
