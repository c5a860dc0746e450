//! 有声书重建：驱动一个远端网页播放器，逐段发现并下载分段音频。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/时间读数/目录约定等基础设施
//! - `session`：播放器会话抽象与基于它的播放器操作
//! - `fetch`：分段与封面下载、MP3 时长测量
//! - `reconstruct`：章节索引、分段映射、定位、续传与主循环

pub mod base_system;
pub mod fetch;
pub mod reconstruct;
pub mod session;
