//! 播放器时间读数（`H:MM:SS` / `MM:SS`）与整数秒之间的转换。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time readout: {0:?}")]
pub struct TimeFormatError(pub String);

/// 解析播放器显示的时间。剩余时间读数带前导 `-`，会被忽略。
pub fn to_seconds(text: &str) -> Result<u32, TimeFormatError> {
    let err = || TimeFormatError(text.to_string());

    let trimmed = text.trim().trim_start_matches(['-', '+', '−']).trim();
    if trimmed.is_empty() {
        return Err(err());
    }

    let mut fields = Vec::with_capacity(3);
    for raw in trimmed.split(':') {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        fields.push(raw.parse::<u32>().map_err(|_| err())?);
    }

    let (h, m, s) = match fields.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] if *m < 60 => (*h, *m, *s),
        _ => return Err(err()),
    };
    if s >= 60 {
        return Err(err());
    }

    h.checked_mul(3600)
        .and_then(|v| v.checked_add(m.checked_mul(60)?))
        .and_then(|v| v.checked_add(s))
        .ok_or_else(err)
}

pub fn to_hms(total: u32) -> String {
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{h}:{m:02}:{s:02}")
}
