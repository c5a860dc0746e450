//! 单本书的重建主流程：续传校验 → 打开播放器 → 章节索引与分段映射 →
//! 循环下载/定位分段 → 封面与章节文件。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::chapter_index::{ChapterIndex, ChapterMark};
use super::error::ReconstructError;
use super::locator::{self, PartLocator, SearchSettings};
use super::models::{BookOutcome, BookState};
use super::part_map;
use super::progress::{ProgressCallback, make_reporter};
use super::resumer::{self, ResumePoint};
use super::status::{self, BookStatus};
use crate::base_system::book_paths::{bad_marker_path, chapters_path, cover_path, part_file_path};
use crate::base_system::context::Config;
use crate::fetch::{DurationProbe, PartFetcher};
use crate::session::player::Player;
use crate::session::{BrowserSession, Scheduler};

#[derive(Debug, Clone)]
pub struct BookJob {
    pub book_id: String,
    pub url: String,
    pub work_dir: PathBuf,
}

impl BookJob {
    pub fn with_work_dir(book_id: &str, url: &str, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            book_id: book_id.to_string(),
            url: url.to_string(),
            work_dir: work_dir.into(),
        }
    }
}

pub struct Reconstructor<'a> {
    config: &'a Config,
    session: &'a mut dyn BrowserSession,
    clock: &'a dyn Scheduler,
    fetcher: &'a mut dyn PartFetcher,
    probe: &'a dyn DurationProbe,
    progress: Option<ProgressCallback>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(
        config: &'a Config,
        session: &'a mut dyn BrowserSession,
        clock: &'a dyn Scheduler,
        fetcher: &'a mut dyn PartFetcher,
        probe: &'a dyn DurationProbe,
    ) -> Self {
        Self {
            config,
            session,
            clock,
            fetcher,
            probe,
            progress: None,
        }
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    /// 重建一本书。`SearchExhausted` 与章节结构错误会给目录打上放弃标记。
    pub fn get_book(&mut self, job: &BookJob) -> Result<BookOutcome, ReconstructError> {
        info!(target: "reconstruct", book_id = %job.book_id, dir = %job.work_dir.display(), "开始重建");
        match self.run(job) {
            Ok(outcome) => {
                info!(
                    target: "reconstruct",
                    book_id = %job.book_id,
                    parts = outcome.parts,
                    loaded = outcome.loaded_duration_sec,
                    "重建完成"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(target: "reconstruct", book_id = %job.book_id, error = %e, "重建失败");
                if e.should_poison() {
                    if let Err(mark_err) = status::mark_poisoned(&job.work_dir, &e.to_string()) {
                        warn!(target: "reconstruct", error = %mark_err, "写入放弃标记失败");
                    }
                }
                Err(e)
            }
        }
    }

    fn run(&mut self, job: &BookJob) -> Result<BookOutcome, ReconstructError> {
        let dir = job.work_dir.as_path();
        if status::is_poisoned(dir) {
            return Err(ReconstructError::Poisoned {
                marker: bad_marker_path(dir),
            });
        }

        let resume = resumer::resume(dir, self.probe, self.config.resume_tolerance_secs)?;
        if resume.is_complete() {
            info!(target: "reconstruct", parts = resume.parts, "目录已完整，跳过");
            return Ok(completed_outcome(dir, &resume));
        }
        fs::create_dir_all(dir).map_err(|e| ReconstructError::io(dir, e))?;

        let mut player = Player::new(&mut *self.session, self.clock, self.config);
        player.open(&job.url)?;
        player.rewind_to_start()?;
        let expected = player.position()? + player.remaining()?;
        if let Some(persisted) = resume.expected_duration_sec {
            if persisted.abs_diff(expected) > self.config.resume_tolerance_secs {
                warn!(target: "reconstruct", persisted, expected, "全书时长与上次记录不一致，以播放器为准");
            }
        }

        let toc = player.table_of_contents()?;
        let chapters = ChapterIndex::from_toc(&toc, expected)?;
        let mut map = part_map::walk(&mut player, &chapters)?;

        let mut state = BookState {
            expected_duration_sec: expected,
            loaded_duration_sec: resume.loaded_duration_sec,
            next_part_num: resume.next_part_num,
        };
        info!(
            target: "reconstruct",
            expected,
            chapters = chapters.real_len(),
            next_part = state.next_part_num,
            "播放器就绪"
        );
        debug!(target: "reconstruct", starts = ?chapters.chapter_seconds(), "章节起点");

        let mut reporter = make_reporter(
            expected,
            state.loaded_duration_sec,
            state.next_part_num - 1,
            self.progress.take(),
        );
        let settings = SearchSettings::from_config(self.config);
        let mut measured_sec = resume.measured_sec;

        while !state.is_complete() {
            let part = state.next_part_num;
            if let Some(url) = player.part_url(part)? {
                let secs = self.fetcher.fetch_part(&url, dir, part);
                if secs == 0 {
                    reporter.finish();
                    return Err(ReconstructError::FetchFailed { part, url });
                }
                // 只测量新落盘的分段，累加到已有的实测值上
                measured_sec +=
                    resumer::measure_part(dir, part, &part_file_path(dir, part), self.probe)?;
                state.loaded_duration_sec = measured_sec.floor() as u32;
                state.next_part_num += 1;
                BookStatus::new(expected, state.loaded_duration_sec, state.next_part_num)
                    .save(dir)?;
                debug!(
                    target: "reconstruct",
                    part,
                    secs,
                    loaded = state.loaded_duration_sec,
                    "分段已保存"
                );
                reporter.update(state.loaded_duration_sec, part);
                continue;
            }

            let range = locator::initial_range(
                &chapters,
                &map,
                part,
                state.loaded_duration_sec,
                settings.clip_secs,
            );
            let located = PartLocator::new(&mut player, &chapters, settings)
                .locate(part, range)
                .inspect_err(|_| reporter.finish())?;
            map.tighten(part, chapters.containing(located.position));
        }
        reporter.finish();

        let cover = match player.cover_url() {
            Ok(Some(url)) => self.fetch_cover(&url, dir),
            Ok(None) => {
                debug!(target: "reconstruct", "请求日志中没有封面");
                None
            }
            Err(e) => {
                warn!(target: "reconstruct", error = %e, "读取封面地址失败");
                None
            }
        };
        if let Err(e) = write_chapters(dir, chapters.marks()) {
            warn!(target: "reconstruct", error = %e, "写入 chapters.json 失败");
        }

        Ok(BookOutcome {
            parts: state.next_part_num - 1,
            loaded_duration_sec: state.loaded_duration_sec,
            expected_duration_sec: expected,
            chapters: chapters.marks().to_vec(),
            cover,
            resumed_from: resume.next_part_num,
        })
    }

    fn fetch_cover(&mut self, url: &str, dir: &Path) -> Option<PathBuf> {
        let dest = cover_path(dir);
        if self.fetcher.fetch_cover(url, &dest) {
            Some(dest)
        } else {
            warn!(target: "reconstruct", url, "封面下载失败");
            None
        }
    }
}

fn completed_outcome(dir: &Path, resume: &ResumePoint) -> BookOutcome {
    let cover = Some(cover_path(dir)).filter(|p| p.exists());
    BookOutcome {
        parts: resume.parts,
        loaded_duration_sec: resume.loaded_duration_sec,
        expected_duration_sec: resume.expected_duration_sec.unwrap_or_default(),
        chapters: read_chapters(dir).unwrap_or_default(),
        cover,
        resumed_from: resume.next_part_num,
    }
}

pub fn write_chapters(dir: &Path, marks: &[ChapterMark]) -> Result<(), ReconstructError> {
    let path = chapters_path(dir);
    let body =
        serde_json::to_string_pretty(marks).map_err(|e| ReconstructError::io(&path, e.into()))?;
    fs::write(&path, body).map_err(|e| ReconstructError::io(path, e))
}

pub fn read_chapters(dir: &Path) -> Result<Vec<ChapterMark>, ReconstructError> {
    let path = chapters_path(dir);
    let raw = fs::read_to_string(&path).map_err(|e| ReconstructError::io(&path, e))?;
    serde_json::from_str(&raw).map_err(|e| ReconstructError::io(path, e.into()))
}
