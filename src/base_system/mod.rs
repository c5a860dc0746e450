//! 基础设施：配置、日志、路径约定、时间读数。

pub mod book_paths;
pub mod config;
pub mod context;
pub mod logging;
pub mod time_fmt;
