//! 测试用的确定性播放器：播放头移动到某分段的可见区间时，
//! 把该分段的 URL 追加到请求日志；`wait` 在播放状态下推进播放头。

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use super::{BrowserSession, ObservedRequest, PlayerKey, Scheduler, SessionError};
use crate::base_system::context::{Config, PlayerSelectors};
use crate::base_system::time_fmt::to_hms;

pub(crate) const FAKE_COVER_URL: &str = "https://listen.overdrive.com/covers/ABC123.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakePart {
    pub start: u32,
    pub end: u32,
    /// 播放头位于 `[reveal_from, reveal_until)` 时该分段出现在请求日志里
    pub reveal_from: u32,
    pub reveal_until: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeBook {
    pub total: u32,
    pub chapters: Vec<u32>,
    pub parts: Vec<FakePart>,
    pub jump_overshoot: u32,
    pub next_enabled_at_end: bool,
}

impl FakeBook {
    /// 按 `part_len` 等长切分，每个分段在自身时间范围内可见。
    pub fn evenly_split(total: u32, chapters: &[u32], part_len: u32) -> Self {
        let mut parts = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + part_len).min(total);
            parts.push(FakePart {
                start,
                end,
                reveal_from: start,
                reveal_until: end,
            });
            start = end;
        }
        Self {
            total,
            chapters: chapters.to_vec(),
            parts,
            jump_overshoot: 0,
            next_enabled_at_end: false,
        }
    }

    pub fn part_len(&self, part_num: u32) -> u32 {
        self.parts
            .get(part_num as usize - 1)
            .map(|p| p.end - p.start)
            .unwrap_or(0)
    }

    pub fn part_url(part_num: u32) -> String {
        format!("https://audio.example.test/odm/ABC123-Part{part_num:02}.mp3?sig={part_num}")
    }

    fn chapter_at(&self, position: u32) -> usize {
        self.chapters
            .iter()
            .rposition(|start| *start <= position)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct FakeState {
    book: FakeBook,
    selectors: PlayerSelectors,
    position: u32,
    playing: bool,
    play_carry_ms: u128,
    requests: Vec<ObservedRequest>,
    revealed: BTreeSet<u32>,
    fail_reads: u32,
    /// 目录标题只渲染出一部分的剩余次数
    partial_toc_reads: u32,
    calls: u32,
    keys: Vec<PlayerKey>,
}

impl FakeState {
    fn reveal(&mut self) {
        let pos = self.position;
        for (idx, part) in self.book.parts.iter().enumerate() {
            let n = idx as u32 + 1;
            if part.reveal_from <= pos && pos < part.reveal_until && self.revealed.insert(n) {
                self.requests.push(ObservedRequest {
                    url: FakeBook::part_url(n),
                    has_response: true,
                });
            }
        }
    }

    fn move_to(&mut self, position: u32) {
        self.position = position.min(self.book.total);
        self.reveal();
    }

    fn current_chapter(&self) -> usize {
        self.book.chapter_at(self.position)
    }

    fn apply_key(&mut self, key: PlayerKey, config: &Config) {
        self.keys.push(key);
        let pos = self.position;
        match key {
            PlayerKey::SkipBackCoarse => self.move_to(pos.saturating_sub(config.coarse_skip_secs)),
            PlayerKey::SkipForwardCoarse => self.move_to(pos + config.coarse_skip_secs),
            PlayerKey::SkipBackFine => self.move_to(pos.saturating_sub(config.fine_skip_secs)),
            PlayerKey::SkipForwardFine => self.move_to(pos + config.fine_skip_secs),
            PlayerKey::PreviousChapter => {
                let cur = self.current_chapter();
                let start = self.book.chapters.get(cur).copied().unwrap_or(0);
                if pos > start {
                    self.move_to(start);
                } else if cur > 0 {
                    self.move_to(self.book.chapters[cur - 1]);
                }
            }
            PlayerKey::NextChapter => {
                let cur = self.current_chapter();
                if let Some(next) = self.book.chapters.get(cur + 1).copied() {
                    self.move_to(next);
                }
            }
            PlayerKey::PlayPause => self.playing = !self.playing,
        }
    }
}

/// 会话与时钟共用同一份状态：`clone()` 一份作为会话，原件作为调度器。
#[derive(Debug, Clone)]
pub(crate) struct FakePlayer {
    state: Rc<RefCell<FakeState>>,
    config: Config,
}

impl FakePlayer {
    pub fn new(book: FakeBook) -> Self {
        Self::with_config(book, Config::default())
    }

    pub fn with_config(book: FakeBook, config: Config) -> Self {
        let state = FakeState {
            book,
            selectors: config.selectors.clone(),
            position: 0,
            playing: false,
            play_carry_ms: 0,
            requests: Vec::new(),
            revealed: BTreeSet::new(),
            fail_reads: 0,
            partial_toc_reads: 0,
            calls: 0,
            keys: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            config,
        }
    }

    pub fn position(&self) -> u32 {
        self.state.borrow().position
    }

    pub fn set_position(&self, position: u32) {
        self.state.borrow_mut().move_to(position);
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.state.borrow_mut().fail_reads = count;
    }

    pub fn truncate_next_toc_reads(&self, count: u32) {
        self.state.borrow_mut().partial_toc_reads = count;
    }

    pub fn calls(&self) -> u32 {
        self.state.borrow().calls
    }

    pub fn keys(&self) -> Vec<PlayerKey> {
        self.state.borrow().keys.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    fn touch(&self) -> std::cell::RefMut<'_, FakeState> {
        let mut state = self.state.borrow_mut();
        state.calls += 1;
        state
    }
}

impl BrowserSession for FakePlayer {
    fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
        let mut state = self.touch();
        if !state.requests.iter().any(|r| r.url == FAKE_COVER_URL) {
            state.requests.push(ObservedRequest {
                url: FAKE_COVER_URL.to_string(),
                has_response: true,
            });
        }
        state.reveal();
        Ok(())
    }

    fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        let mut state = self.touch();
        let selectors = state.selectors.clone();
        if selector == selectors.toc_open || selector == selectors.toc_close {
            Ok(())
        } else if selector == selectors.chapter_previous {
            state.apply_key(PlayerKey::PreviousChapter, &self.config);
            Ok(())
        } else if selector == selectors.chapter_next {
            state.apply_key(PlayerKey::NextChapter, &self.config);
            Ok(())
        } else {
            Err(SessionError::ElementMissing(selector.to_string()))
        }
    }

    fn click_nth(&mut self, selector: &str, index: usize) -> Result<(), SessionError> {
        let mut state = self.touch();
        if selector != state.selectors.toc_entry_title {
            return Err(SessionError::ElementMissing(selector.to_string()));
        }
        let Some(start) = state.book.chapters.get(index).copied() else {
            return Err(SessionError::NoSuchIndex {
                selector: selector.to_string(),
                index,
            });
        };
        let landing = (start + state.book.jump_overshoot).min(state.book.total.saturating_sub(1));
        state.move_to(landing);
        Ok(())
    }

    fn is_enabled(&mut self, selector: &str) -> Result<bool, SessionError> {
        let state = self.touch();
        if selector == state.selectors.chapter_previous {
            Ok(state.position > 0)
        } else if selector == state.selectors.chapter_next {
            Ok(state.current_chapter() + 1 < state.book.chapters.len()
                || state.book.next_enabled_at_end)
        } else {
            Err(SessionError::ElementMissing(selector.to_string()))
        }
    }

    fn read_text(&mut self, selector: &str) -> Result<String, SessionError> {
        let mut state = self.touch();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(SessionError::ElementMissing(selector.to_string()));
        }
        if selector == state.selectors.time_elapsed {
            Ok(to_hms(state.position))
        } else if selector == state.selectors.time_remaining {
            Ok(format!("-{}", to_hms(state.book.total - state.position)))
        } else {
            Err(SessionError::ElementMissing(selector.to_string()))
        }
    }

    fn read_texts(&mut self, selector: &str) -> Result<Vec<String>, SessionError> {
        let mut state = self.touch();
        if selector == state.selectors.toc_entry_title {
            let mut shown = state.book.chapters.len();
            if state.partial_toc_reads > 0 {
                state.partial_toc_reads -= 1;
                shown = shown.saturating_sub(1);
            }
            Ok((1..=shown).map(|i| format!("Chapter {i}")).collect())
        } else if selector == state.selectors.toc_entry_time {
            Ok(state.book.chapters.iter().map(|s| to_hms(*s)).collect())
        } else {
            Err(SessionError::ElementMissing(selector.to_string()))
        }
    }

    fn send_key(&mut self, key: PlayerKey) -> Result<(), SessionError> {
        let mut state = self.touch();
        state.apply_key(key, &self.config);
        Ok(())
    }

    fn observed_requests(&mut self) -> Result<Vec<ObservedRequest>, SessionError> {
        Ok(self.touch().requests.clone())
    }
}

impl Scheduler for FakePlayer {
    fn wait(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        if !state.playing {
            return;
        }
        let total_ms = state.play_carry_ms + duration.as_millis();
        state.play_carry_ms = total_ms % 1000;
        for _ in 0..(total_ms / 1000) {
            if state.position >= state.book.total {
                break;
            }
            let next = state.position + 1;
            state.move_to(next);
        }
    }
}
