//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::ProgressSnapshot;

pub type ProgressCallback = Box<dyn FnMut(ProgressSnapshot) + Send>;

pub(crate) struct ProgressReporter {
    pub(crate) snapshot: ProgressSnapshot,
    cb: Option<ProgressCallback>, // optional UI callback
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub(crate) fn emit(&mut self) {
        if let Some(cb) = self.cb.as_mut() {
            cb(self.snapshot);
        }
        if let Some(bar) = self.bar.as_ref() {
            bar.set_length(u64::from(self.snapshot.expected_sec));
            bar.set_position(u64::from(self.snapshot.loaded_sec));
            bar.set_message(format!("{} 段", self.snapshot.parts));
        }
    }

    pub(crate) fn update(&mut self, loaded_sec: u32, parts: u32) {
        self.snapshot.loaded_sec = loaded_sec;
        self.snapshot.parts = parts;
        self.emit();
    }

    pub(crate) fn finish(&mut self) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        bar.finish_and_clear();
    }
}

// ── 构造函数 ──────────────────────────────────────────────────

/// 传入回调时由调用方负责展示，不再绘制终端进度条。
pub(crate) fn make_reporter(
    expected_sec: u32,
    loaded_sec: u32,
    parts: u32,
    progress: Option<ProgressCallback>,
) -> ProgressReporter {
    let bar = if progress.is_none() {
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len}s {msg} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        let bar = ProgressBar::with_draw_target(
            Some(u64::from(expected_sec)),
            ProgressDrawTarget::stderr(),
        );
        bar.set_style(style);
        bar.set_prefix("音频下载");
        Some(bar)
    } else {
        None
    };

    let mut reporter = ProgressReporter {
        snapshot: ProgressSnapshot {
            loaded_sec,
            expected_sec,
            parts,
        },
        cb: progress,
        bar,
    };
    reporter.emit();
    reporter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_receives_every_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reporter = make_reporter(
            3600,
            0,
            0,
            Some(Box::new(move |s: ProgressSnapshot| {
                sink.lock().expect("lock").push((s.loaded_sec, s.parts));
            })),
        );
        reporter.update(1200, 1);
        reporter.update(2400, 2);
        reporter.finish();

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![(0, 0), (1200, 1), (2400, 2)]
        );
    }
}
