//! 播放器操作封装：每个动作之后都会等待界面稳定。

use std::time::Duration;

use tracing::{debug, trace};

use super::request_log::{self, PartRecord};
use super::{BrowserSession, PlayerKey, Scheduler, SessionError};
use crate::base_system::context::Config;
use crate::base_system::time_fmt::to_seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStep {
    Coarse,
    Fine,
}

impl SkipStep {
    pub fn secs(self, config: &Config) -> u32 {
        match self {
            SkipStep::Coarse => config.coarse_skip_secs,
            SkipStep::Fine => config.fine_skip_secs,
        }
    }

    fn key(self, forward: bool) -> PlayerKey {
        match (self, forward) {
            (SkipStep::Coarse, true) => PlayerKey::SkipForwardCoarse,
            (SkipStep::Coarse, false) => PlayerKey::SkipBackCoarse,
            (SkipStep::Fine, true) => PlayerKey::SkipForwardFine,
            (SkipStep::Fine, false) => PlayerKey::SkipBackFine,
        }
    }
}

/// 目录弹窗中读到的原始文本，按行对应。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocListing {
    pub titles: Vec<String>,
    pub offsets: Vec<String>,
}

pub struct Player<'a> {
    session: &'a mut dyn BrowserSession,
    clock: &'a dyn Scheduler,
    config: &'a Config,
}

impl<'a> Player<'a> {
    pub fn new(
        session: &'a mut dyn BrowserSession,
        clock: &'a dyn Scheduler,
        config: &'a Config,
    ) -> Self {
        Self {
            session,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn wait(&self, duration: Duration) {
        self.clock.wait(duration);
    }

    pub fn open(&mut self, url: &str) -> Result<(), SessionError> {
        debug!(target: "player", url, "打开播放器");
        self.session.navigate(url)?;
        self.wait(self.config.open_settle());
        Ok(())
    }

    /// 对短暂性错误按 `read_retries` 重试，每次间隔 `click_settle`。
    fn retry<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut dyn BrowserSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut attempt = 0;
        loop {
            match op(&mut *self.session) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.config.read_retries => {
                    attempt += 1;
                    trace!(target: "player", what, attempt, error = %e, "读取失败，稍后重试");
                    self.clock.wait(self.config.click_settle());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn read_seconds(&mut self, selector: &str) -> Result<u32, SessionError> {
        self.retry(selector, |s| {
            let text = s.read_text(selector)?;
            to_seconds(&text).map_err(SessionError::Readout)
        })
    }

    /// 当前播放位置（秒）。
    pub fn position(&mut self) -> Result<u32, SessionError> {
        let selector = self.config.selectors.time_elapsed.clone();
        self.read_seconds(&selector)
    }

    /// 剩余时长（秒），读数形如 `-9:58:10`。
    pub fn remaining(&mut self) -> Result<u32, SessionError> {
        let selector = self.config.selectors.time_remaining.clone();
        self.read_seconds(&selector)
    }

    pub fn can_go_previous(&mut self) -> Result<bool, SessionError> {
        let selector = self.config.selectors.chapter_previous.clone();
        self.retry(&selector, |s| s.is_enabled(&selector))
    }

    pub fn can_go_next(&mut self) -> Result<bool, SessionError> {
        let selector = self.config.selectors.chapter_next.clone();
        self.retry(&selector, |s| s.is_enabled(&selector))
    }

    fn press(&mut self, key: PlayerKey, settle: Duration) -> Result<(), SessionError> {
        self.retry("key", |s| s.send_key(key))?;
        self.wait(settle);
        Ok(())
    }

    pub fn previous_chapter(&mut self) -> Result<(), SessionError> {
        self.press(PlayerKey::PreviousChapter, self.config.chapter_settle())
    }

    pub fn next_chapter(&mut self) -> Result<(), SessionError> {
        self.press(PlayerKey::NextChapter, self.config.chapter_settle())
    }

    pub fn skip(&mut self, step: SkipStep, forward: bool) -> Result<(), SessionError> {
        self.press(step.key(forward), self.config.skip_settle())
    }

    pub fn toggle_playback(&mut self) -> Result<(), SessionError> {
        self.press(PlayerKey::PlayPause, self.config.click_settle())
    }

    /// 连按“上一章”直到按钮不可用，返回按下的次数。
    pub fn rewind_to_start(&mut self) -> Result<u32, SessionError> {
        let mut steps = 0;
        while steps < self.config.max_rewind_steps && self.can_go_previous()? {
            self.press(PlayerKey::PreviousChapter, self.config.click_settle())?;
            steps += 1;
        }
        self.wait(self.config.open_settle());
        debug!(target: "player", steps, "已回到书首");
        Ok(steps)
    }

    pub fn table_of_contents(&mut self) -> Result<TocListing, SessionError> {
        let selectors = self.config.selectors.clone();
        self.retry(&selectors.toc_open, |s| s.click(&selectors.toc_open))?;
        self.wait(self.config.click_settle());

        // 弹窗展开动画中两列可能只渲染了一部分，长度不一致时整体重读
        let (titles, offsets) = self.retry(&selectors.toc_entry_title, |s| {
            let titles = s.read_texts(&selectors.toc_entry_title)?;
            let offsets = s.read_texts(&selectors.toc_entry_time)?;
            if titles.len() != offsets.len() {
                return Err(SessionError::TocMismatch {
                    titles: titles.len(),
                    offsets: offsets.len(),
                });
            }
            Ok((titles, offsets))
        })?;

        // 弹窗可能已自动关闭，关不掉不影响后续操作
        if let Err(e) = self.session.click(&selectors.toc_close) {
            debug!(target: "player", error = %e, "关闭目录弹窗失败");
        }
        self.wait(self.config.click_settle());

        Ok(TocListing {
            titles: titles.into_iter().map(|t| t.trim().to_string()).collect(),
            offsets,
        })
    }

    /// 通过目录弹窗跳到第 `index` 章。
    pub fn jump_to_chapter(&mut self, index: usize) -> Result<(), SessionError> {
        let selectors = self.config.selectors.clone();
        self.retry(&selectors.toc_open, |s| s.click(&selectors.toc_open))?;
        self.wait(self.config.click_settle());
        self.retry(&selectors.toc_entry_title, |s| {
            s.click_nth(&selectors.toc_entry_title, index)
        })?;
        self.wait(self.config.chapter_settle());
        Ok(())
    }

    pub fn part_records(&mut self) -> Result<Vec<PartRecord>, SessionError> {
        let requests = self.retry("requests", |s| s.observed_requests())?;
        Ok(request_log::part_records(&requests))
    }

    pub fn part_url(&mut self, part_num: u32) -> Result<Option<String>, SessionError> {
        Ok(self
            .part_records()?
            .into_iter()
            .find(|r| r.part_num == part_num)
            .map(|r| r.url))
    }

    pub fn has_part(&mut self, part_num: u32) -> Result<bool, SessionError> {
        Ok(self.part_url(part_num)?.is_some())
    }

    pub fn cover_url(&mut self) -> Result<Option<String>, SessionError> {
        let requests = self.retry("requests", |s| s.observed_requests())?;
        Ok(request_log::cover_url(&requests, &self.config.cover_host))
    }
}
