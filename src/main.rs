//! 有声书重建工具的命令行入口：检查、测量与维护书籍工作目录。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use audiobook_reconstruct::base_system::book_paths::book_folder_path;
use audiobook_reconstruct::base_system::config::load_or_create;
use audiobook_reconstruct::base_system::context::Config;
use audiobook_reconstruct::base_system::logging::{LogOptions, LogSystem};
use audiobook_reconstruct::base_system::time_fmt::to_hms;
use audiobook_reconstruct::fetch::DurationProbe;
use audiobook_reconstruct::fetch::probe::Mp3Probe;
use audiobook_reconstruct::reconstruct::reconstruction::read_chapters;
use audiobook_reconstruct::reconstruct::{ReconstructError, resumer, status};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "audiobook-reconstruct")]
#[command(about = "Audiobook part reconstruction toolkit")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 校验书籍目录能否续传，输出续传位置或损坏原因
    Check { book: String },
    /// 测量 MP3 文件时长
    Probe {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 删除书籍目录的放弃标记
    ClearBad { book: String },
    /// 打印 chapters.json
    Chapters { book: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("audiobook-reconstruct v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;
    let config =
        load_or_create::<Config>(None, data_dir).map_err(|e| anyhow!(e.to_string()))?;

    let Some(command) = cli.command else {
        return Err(anyhow!("no command given, see --help"));
    };

    match command {
        Command::Check { book } => check(&config, &book_dir(&config, &book)),
        Command::Probe { files } => probe(&files),
        Command::ClearBad { book } => clear_bad(&book_dir(&config, &book)),
        Command::Chapters { book } => chapters(&book_dir(&config, &book)),
    }
}

/// 参数可以是目录路径，也可以是保存目录下的书籍 ID。
fn book_dir(config: &Config, book: &str) -> PathBuf {
    let path = PathBuf::from(book);
    if path.is_dir() {
        path
    } else {
        book_folder_path(config, book, None)
    }
}

fn check(config: &Config, dir: &Path) -> Result<()> {
    if status::is_poisoned(dir) {
        warn!(target: "startup", dir = %dir.display(), "目录带有放弃标记");
        println!("poisoned: delete the marker with `clear-bad` to retry");
    }
    match resumer::resume(dir, &Mp3Probe, config.resume_tolerance_secs) {
        Ok(point) => {
            let expected = point
                .expected_duration_sec
                .map(to_hms)
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "parts: {}  loaded: {}  expected: {}  next part: {}{}",
                point.parts,
                to_hms(point.loaded_duration_sec),
                expected,
                point.next_part_num,
                if point.is_complete() { "  (complete)" } else { "" }
            );
            Ok(())
        }
        Err(e @ ReconstructError::CorruptState { .. }) => {
            println!("corrupt: {e}");
            Err(anyhow!(e))
        }
        Err(e) => Err(anyhow!(e)).context(format!("检查目录失败: {}", dir.display())),
    }
}

fn probe(files: &[PathBuf]) -> Result<()> {
    let mut total = 0.0;
    for file in files {
        let secs = Mp3Probe
            .measure(file)
            .with_context(|| format!("无法测量 {}", file.display()))?;
        total += secs;
        println!("{:>10.3}s  {}", secs, file.display());
    }
    if files.len() > 1 {
        println!("{:>10.3}s  total ({})", total, to_hms(total.floor() as u32));
    }
    Ok(())
}

fn clear_bad(dir: &Path) -> Result<()> {
    if status::clear_poisoned(dir).map_err(|e| anyhow!(e))? {
        info!(target: "startup", dir = %dir.display(), "已删除放弃标记");
    } else {
        println!("no marker in {}", dir.display());
    }
    Ok(())
}

fn chapters(dir: &Path) -> Result<()> {
    let marks = read_chapters(dir).map_err(|e| anyhow!(e))?;
    for mark in marks {
        println!(
            "{:>8}  {}",
            to_hms(mark.start_sec),
            mark.title.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
        ..LogOptions::default()
    };
    let log = LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))?;
    debug!(target: "startup", logs = %log.logs_dir().display(), "日志系统已初始化");
    Ok(log)
}
