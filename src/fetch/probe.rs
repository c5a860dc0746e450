//! MP3 时长测量：由 symphonia 解复用全部帧并累加帧时长。
//!
//! 有效帧太少的文件视为可疑（通常是返回了 HTML 的过期会话页面，
//! 恰好夹杂一个类似帧头的字节序列），直接拒绝，不计入时长。

use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::Path;

use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::DurationProbe;

/// 少于这么多帧的文件不是可信的分段。
pub const MIN_FRAMES: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub seconds: f64,
    pub frames: u64,
}

impl Measurement {
    pub fn is_sketchy(&self) -> bool {
        self.frames < MIN_FRAMES || self.seconds <= 0.0
    }
}

fn invalid(path: &Path, msg: impl std::fmt::Display) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, format!("{}: {}", path.display(), msg))
}

/// 逐帧读取，不解码。
pub fn measure_file(path: &Path) -> io::Result<Measurement> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| invalid(path, format!("not MPEG audio ({e})")))?;
    let mut format = probed.format;

    let (track_id, time_base) = {
        let track = format
            .default_track()
            .ok_or_else(|| invalid(path, "no audio track"))?;
        let time_base = track
            .codec_params
            .time_base
            .or_else(|| {
                track
                    .codec_params
                    .sample_rate
                    .map(|rate| symphonia::core::units::TimeBase::new(1, rate))
            })
            .ok_or_else(|| invalid(path, "unknown sample rate"))?;
        (track.id, time_base)
    };

    let mut ticks = 0u64;
    let mut frames = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                ticks += packet.dur;
                frames += 1;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(invalid(path, format!("broken frame after {frames} frames ({e})"))),
        }
    }

    let time = time_base.calc_time(ticks);
    Ok(Measurement {
        seconds: time.seconds as f64 + time.frac,
        frames,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Mp3Probe;

impl DurationProbe for Mp3Probe {
    fn measure(&self, path: &Path) -> io::Result<f64> {
        let m = measure_file(path)?;
        if m.is_sketchy() {
            return Err(invalid(
                path,
                format!("sketchy MP3: {} frames, {:.3}s", m.frames, m.seconds),
            ));
        }
        Ok(m.seconds)
    }
}
