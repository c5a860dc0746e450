//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default)]
    pub save_path: String,

    // 界面等待（毫秒）
    #[serde(default = "default_open_settle_ms")]
    pub open_settle_ms: u64,
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,
    #[serde(default = "default_chapter_settle_ms")]
    pub chapter_settle_ms: u64,
    #[serde(default = "default_skip_settle_ms")]
    pub skip_settle_ms: u64,
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    // 跳转步长（秒）
    #[serde(default = "default_coarse_skip_secs")]
    pub coarse_skip_secs: u32,
    #[serde(default = "default_fine_skip_secs")]
    pub fine_skip_secs: u32,

    // 搜索参数
    #[serde(default = "default_fuzz_window_secs")]
    pub fuzz_window_secs: u32,
    #[serde(default = "default_search_clip_hours")]
    pub search_clip_hours: u32,
    #[serde(default = "default_max_skip_presses")]
    pub max_skip_presses: u32,
    #[serde(default = "default_min_playback_secs")]
    pub min_playback_secs: u32,
    #[serde(default = "default_playback_poll_secs")]
    pub playback_poll_secs: u32,

    // 章节遍历
    #[serde(default = "default_walk_nudge_back")]
    pub walk_nudge_back: u32,
    #[serde(default = "default_walk_nudge_forward")]
    pub walk_nudge_forward: u32,
    #[serde(default = "default_trailing_sweep_presses")]
    pub trailing_sweep_presses: u32,
    #[serde(default = "default_max_rewind_steps")]
    pub max_rewind_steps: u32,

    // 续传校验
    #[serde(default = "default_resume_tolerance_secs")]
    pub resume_tolerance_secs: u32,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_cover_host")]
    pub cover_host: String,

    // 播放器页面元素
    #[serde(default)]
    pub selectors: PlayerSelectors,
}

/// 播放器页面上用到的 CSS 选择器。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSelectors {
    pub chapter_previous: String,
    pub chapter_next: String,
    pub time_elapsed: String,
    pub time_remaining: String,
    pub toc_open: String,
    pub toc_close: String,
    pub toc_entry_title: String,
    pub toc_entry_time: String,
}

impl Default for PlayerSelectors {
    fn default() -> Self {
        Self {
            chapter_previous: ".chapter-bar-prev-button".to_string(),
            chapter_next: ".chapter-bar-next-button".to_string(),
            time_elapsed: ".timeline-start-minutes .place-phrase-visual".to_string(),
            time_remaining: ".timeline-end-minutes .place-phrase-visual".to_string(),
            toc_open: ".chapter-bar-title".to_string(),
            toc_close: ".chapter-dialog .shibui-dialog-close".to_string(),
            toc_entry_title: ".chapter-dialog-row-title".to_string(),
            toc_entry_time: ".chapter-dialog-row-time .place-phrase-visual".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            open_settle_ms: default_open_settle_ms(),
            click_settle_ms: default_click_settle_ms(),
            chapter_settle_ms: default_chapter_settle_ms(),
            skip_settle_ms: default_skip_settle_ms(),
            read_retries: default_read_retries(),
            coarse_skip_secs: default_coarse_skip_secs(),
            fine_skip_secs: default_fine_skip_secs(),
            fuzz_window_secs: default_fuzz_window_secs(),
            search_clip_hours: default_search_clip_hours(),
            max_skip_presses: default_max_skip_presses(),
            min_playback_secs: default_min_playback_secs(),
            playback_poll_secs: default_playback_poll_secs(),
            walk_nudge_back: default_walk_nudge_back(),
            walk_nudge_forward: default_walk_nudge_forward(),
            trailing_sweep_presses: default_trailing_sweep_presses(),
            max_rewind_steps: default_max_rewind_steps(),
            resume_tolerance_secs: default_resume_tolerance_secs(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            cover_host: default_cover_host(),
            selectors: PlayerSelectors::default(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 22] = [
            FieldMeta {
                name: "save_path",
                description: "书籍工作目录的根路径（留空为当前目录）",
            },
            FieldMeta {
                name: "open_settle_ms",
                description: "打开播放器页面后的等待时间（毫秒）",
            },
            FieldMeta {
                name: "click_settle_ms",
                description: "普通点击/读取重试后的等待时间（毫秒）",
            },
            FieldMeta {
                name: "chapter_settle_ms",
                description: "切换章节后的等待时间（毫秒）",
            },
            FieldMeta {
                name: "skip_settle_ms",
                description: "快进/快退一次后的等待时间（毫秒）",
            },
            FieldMeta {
                name: "read_retries",
                description: "页面元素短暂缺失时的读取重试次数",
            },
            FieldMeta {
                name: "coarse_skip_secs",
                description: "粗跳按钮对应的秒数",
            },
            FieldMeta {
                name: "fine_skip_secs",
                description: "细跳按钮对应的秒数",
            },
            FieldMeta {
                name: "fuzz_window_secs",
                description: "下界附近的容差窗口（秒），落在此窗口内的位置只抬高下界",
            },
            FieldMeta {
                name: "search_clip_hours",
                description: "单个分段搜索上界距下界的最大跨度（小时）",
            },
            FieldMeta {
                name: "max_skip_presses",
                description: "单次粗/细跳扫描中每个方向的最大按键次数",
            },
            FieldMeta {
                name: "min_playback_secs",
                description: "兜底连续播放的最短时长（秒）",
            },
            FieldMeta {
                name: "playback_poll_secs",
                description: "连续播放时检查请求日志的间隔（秒）",
            },
            FieldMeta {
                name: "walk_nudge_back",
                description: "遍历章节时每章先细跳后退的次数（触发预加载）",
            },
            FieldMeta {
                name: "walk_nudge_forward",
                description: "遍历章节时每章再细跳前进的次数",
            },
            FieldMeta {
                name: "trailing_sweep_presses",
                description: "无法判断是否到达书尾时，额外粗跳前进扫描的次数上限",
            },
            FieldMeta {
                name: "max_rewind_steps",
                description: "回到第一章时最多按“上一章”的次数",
            },
            FieldMeta {
                name: "resume_tolerance_secs",
                description: "续传时已下载时长与记录时长的允许误差（秒）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "下载请求超时时间（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "下载请求使用的 User-Agent",
            },
            FieldMeta {
                name: "cover_host",
                description: "封面图片请求所在的域名（用于从请求日志中识别封面）",
            },
            FieldMeta {
                name: "selectors",
                description: "播放器页面元素的 CSS 选择器",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), String> {
        if self.fine_skip_secs == 0 {
            return Err("fine_skip_secs must be positive".to_string());
        }
        if self.coarse_skip_secs <= self.fine_skip_secs {
            return Err(format!(
                "coarse_skip_secs ({}) must be larger than fine_skip_secs ({})",
                self.coarse_skip_secs, self.fine_skip_secs
            ));
        }
        if self.playback_poll_secs == 0 {
            return Err("playback_poll_secs must be positive".to_string());
        }
        if self.search_clip_hours == 0 {
            return Err("search_clip_hours must be positive".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn chapter_settle(&self) -> Duration {
        Duration::from_millis(self.chapter_settle_ms)
    }

    pub fn skip_settle(&self) -> Duration {
        Duration::from_millis(self.skip_settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn search_clip_secs(&self) -> u32 {
        self.search_clip_hours.saturating_mul(3600)
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            '"' => '\'',
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    trim_trailing_dots(&mut cleaned);

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        trim_trailing_dots(&mut cleaned);
    }

    cleaned
}

fn trim_trailing_dots(name: &mut String) {
    while name.ends_with(' ') || name.ends_with('.') {
        name.pop();
    }
    if name.is_empty() {
        name.push_str("unnamed");
    }
}

fn default_open_settle_ms() -> u64 {
    1000
}

fn default_click_settle_ms() -> u64 {
    200
}

fn default_chapter_settle_ms() -> u64 {
    2000
}

fn default_skip_settle_ms() -> u64 {
    150
}

fn default_read_retries() -> u32 {
    5
}

fn default_coarse_skip_secs() -> u32 {
    60
}

fn default_fine_skip_secs() -> u32 {
    15
}

fn default_fuzz_window_secs() -> u32 {
    15
}

fn default_search_clip_hours() -> u32 {
    3
}

fn default_max_skip_presses() -> u32 {
    240
}

fn default_min_playback_secs() -> u32 {
    60
}

fn default_playback_poll_secs() -> u32 {
    5
}

fn default_walk_nudge_back() -> u32 {
    2
}

fn default_walk_nudge_forward() -> u32 {
    4
}

fn default_trailing_sweep_presses() -> u32 {
    30
}

fn default_max_rewind_steps() -> u32 {
    500
}

fn default_resume_tolerance_secs() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    120
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_cover_host() -> String {
    "listen.overdrive.com".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_fs_name_replaces_forbidden_characters() {
        assert_eq!(safe_fs_name("A/B: C?", "_", 120), "A、B： C？");
        assert_eq!(safe_fs_name("con", "_", 120), "_con");
        assert_eq!(safe_fs_name("...", "_", 120), "unnamed");
    }

    #[test]
    fn safe_fs_name_truncates_on_char_boundary() {
        let name = "有声书".repeat(10);
        let out = safe_fs_name(&name, "_", 10);
        assert!(out.len() <= 10);
        assert!(out.starts_with("有声书"));
    }

    #[test]
    fn field_meta_covers_every_serialized_field() {
        let value = serde_yaml::to_value(Config::default()).expect("serializes");
        let serde_yaml::Value::Mapping(map) = value else {
            panic!("config must be a mapping");
        };
        assert_eq!(map.len(), Config::fields().len());
        for field in Config::fields() {
            assert!(
                map.contains_key(serde_yaml::Value::String(field.name.to_string())),
                "missing field meta for {}",
                field.name
            );
        }
    }
}
