//! 断点续传校验：已有分段必须是从 1 开始的连续序列，
//! 且实测总时长与 `status.json` 记录的相差不超过容差。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::ReconstructError;
use super::status::BookStatus;
use crate::base_system::book_paths::parse_part_file_name;
use crate::fetch::DurationProbe;

#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub parts: u32,
    pub loaded_duration_sec: u32,
    /// 未取整的实测总时长，主循环在此基础上累加新分段
    pub measured_sec: f64,
    pub next_part_num: u32,
    /// 上次运行记录的全书时长；全新目录为 None
    pub expected_duration_sec: Option<u32>,
}

impl ResumePoint {
    pub fn is_complete(&self) -> bool {
        self.expected_duration_sec
            .is_some_and(|e| e > 0 && self.loaded_duration_sec.saturating_add(1) >= e)
    }
}

/// 按分段号排序返回目录中的分段文件；临时文件不计入。
pub fn scan_part_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>, ReconstructError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReconstructError::io(dir, e)),
    };

    let mut parts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReconstructError::io(dir, e))?;
        let name = entry.file_name();
        if let Some(num) = name.to_str().and_then(parse_part_file_name) {
            parts.push((num, entry.path()));
        }
    }
    parts.sort_by_key(|(num, _)| *num);

    for (expected, (num, _)) in (1u32..).zip(&parts) {
        if *num != expected {
            return Err(ReconstructError::corrupt(
                dir,
                format!("part files are not contiguous: expected part {expected}, found part {num}"),
            ));
        }
    }
    Ok(parts)
}

pub fn measure_part(
    dir: &Path,
    part_num: u32,
    path: &Path,
    probe: &dyn DurationProbe,
) -> Result<f64, ReconstructError> {
    probe
        .measure(path)
        .map_err(|e| ReconstructError::corrupt(dir, format!("cannot measure part {part_num}: {e}")))
}

/// 实测总时长（秒，未取整）；按浮点累加后再由调用方向下取整。
pub fn measure_loaded(
    dir: &Path,
    files: &[(u32, PathBuf)],
    probe: &dyn DurationProbe,
) -> Result<f64, ReconstructError> {
    let mut total = 0.0;
    for (num, path) in files {
        total += measure_part(dir, *num, path, probe)?;
    }
    Ok(total)
}

pub fn validate_resume(
    dir: &Path,
    measured: u32,
    persisted: u32,
    tolerance: u32,
) -> Result<(), ReconstructError> {
    let drift = measured.abs_diff(persisted);
    if drift > tolerance {
        return Err(ReconstructError::corrupt(
            dir,
            format!(
                "measured {measured}s of audio but status.json records {persisted}s (tolerance {tolerance}s)"
            ),
        ));
    }
    debug!(target: "resume", measured, persisted, drift, "续传校验通过");
    Ok(())
}

pub fn resume(
    dir: &Path,
    probe: &dyn DurationProbe,
    tolerance: u32,
) -> Result<ResumePoint, ReconstructError> {
    let files = scan_part_files(dir)?;
    let status = BookStatus::load(dir)?;

    let Some(status) = status else {
        if files.is_empty() {
            return Ok(ResumePoint {
                parts: 0,
                loaded_duration_sec: 0,
                measured_sec: 0.0,
                next_part_num: 1,
                expected_duration_sec: None,
            });
        }
        return Err(ReconstructError::corrupt(
            dir,
            format!("{} part files but no status.json", files.len()),
        ));
    };

    let measured_sec = measure_loaded(dir, &files, probe)?;
    let measured = measured_sec.floor() as u32;
    validate_resume(dir, measured, status.loaded_duration_sec, tolerance)?;

    let parts = files.len() as u32;
    if parts > 0 {
        info!(target: "resume", parts, loaded = measured, "从已有分段继续");
    }
    Ok(ResumePoint {
        parts,
        loaded_duration_sec: measured,
        measured_sec,
        next_part_num: parts + 1,
        expected_duration_sec: Some(status.expected_duration_sec),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::{FakeProbe, write_part};

    fn seed(dir: &Path, durations: &[f64], recorded: u32) {
        for (i, secs) in durations.iter().enumerate() {
            write_part(dir, i as u32 + 1, *secs);
        }
        BookStatus::new(7200, recorded, durations.len() as u32 + 1)
            .save(dir)
            .expect("status");
    }

    #[test]
    fn fresh_directory_starts_at_part_one() {
        let dir = tempfile::tempdir().expect("temp dir");
        let point = resume(&dir.path().join("missing"), &FakeProbe, 10).expect("fresh");
        assert_eq!(point.next_part_num, 1);
        assert_eq!(point.expected_duration_sec, None);
        assert!(!point.is_complete());
    }

    #[test]
    fn small_drift_resumes_after_last_part() {
        let dir = tempfile::tempdir().expect("temp dir");
        seed(dir.path(), &[300.4, 309.9], 600);

        let point = resume(dir.path(), &FakeProbe, 10).expect("within tolerance");
        assert_eq!(point.loaded_duration_sec, 610);
        assert_eq!(point.next_part_num, 3);
    }

    #[test]
    fn large_drift_is_corrupt_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        seed(dir.path(), &[300.0, 350.0], 600);

        let err = resume(dir.path(), &FakeProbe, 10).expect_err("650 vs 600");
        assert!(matches!(err, ReconstructError::CorruptState { .. }));
        // 不会自动清理
        assert!(dir.path().join("part02.mp3").exists());
    }

    #[test]
    fn gap_in_part_numbers_is_corrupt_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_part(dir.path(), 1, 300.0);
        write_part(dir.path(), 3, 300.0);
        BookStatus::new(7200, 600, 4).save(dir.path()).expect("status");

        let err = resume(dir.path(), &FakeProbe, 10).expect_err("gap");
        assert!(matches!(err, ReconstructError::CorruptState { .. }));
    }

    #[test]
    fn parts_without_status_are_corrupt_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_part(dir.path(), 1, 300.0);

        let err = resume(dir.path(), &FakeProbe, 10).expect_err("no status");
        assert!(matches!(err, ReconstructError::CorruptState { .. }));
    }

    #[test]
    fn temp_files_are_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        seed(dir.path(), &[300.0], 300);
        fs::write(dir.path().join("part02.mp3.tmp"), "12").expect("tmp");

        let files = scan_part_files(dir.path()).expect("scan");
        assert_eq!(files.len(), 1);
        assert_eq!(
            resume(dir.path(), &FakeProbe, 10).expect("resume").next_part_num,
            2
        );
    }
}
