//! 远端播放器会话抽象。
//!
//! 真实的浏览器自动化层不在本 crate 内；这里只定义引擎需要的最小能力集合
//! （`BrowserSession`）和等待调度（`Scheduler`），方便在测试中替换为确定性的假实现。
//!
//! 子模块：
//! - `player`      — 基于会话的播放器操作（读时间、切章节、快进快退、请求日志）
//! - `request_log` — 从请求日志中提取分段编号与封面地址

pub mod player;
pub mod request_log;

#[cfg(test)]
pub(crate) mod fake;

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::base_system::time_fmt::TimeFormatError;

/// 播放器快捷键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerKey {
    SkipBackCoarse,
    SkipForwardCoarse,
    SkipBackFine,
    SkipForwardFine,
    PreviousChapter,
    NextChapter,
    PlayPause,
}

/// 页面发出过的一条网络请求。日志是累积的，只增不减。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    pub url: String,
    pub has_response: bool,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("element not found: {0}")]
    ElementMissing(String),
    #[error("no element #{index} for {selector}")]
    NoSuchIndex { selector: String, index: usize },
    #[error("unreadable time readout: {0}")]
    Readout(#[from] TimeFormatError),
    #[error("table of contents still rendering: {titles} titles, {offsets} offsets")]
    TocMismatch { titles: usize, offsets: usize },
    #[error("session transport failed: {0}")]
    Transport(String),
}

impl SessionError {
    /// 动画过程中元素短暂消失、读数跳变都属于正常现象，可以等待后重试。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::ElementMissing(_)
                | SessionError::Readout(_)
                | SessionError::TocMismatch { .. }
        )
    }
}

pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError>;
    fn click(&mut self, selector: &str) -> Result<(), SessionError>;
    fn click_nth(&mut self, selector: &str, index: usize) -> Result<(), SessionError>;
    fn is_enabled(&mut self, selector: &str) -> Result<bool, SessionError>;
    fn read_text(&mut self, selector: &str) -> Result<String, SessionError>;
    fn read_texts(&mut self, selector: &str) -> Result<Vec<String>, SessionError>;
    fn send_key(&mut self, key: PlayerKey) -> Result<(), SessionError>;
    fn observed_requests(&mut self) -> Result<Vec<ObservedRequest>, SessionError>;
}

/// 所有界面操作之后的等待都经由这里，测试中替换为假时钟。
pub trait Scheduler {
    fn wait(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
