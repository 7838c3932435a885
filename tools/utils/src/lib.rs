//! 命令行工具依赖的通用组件.

use std::env;
use std::path::PathBuf;

const SEP: &str = "--------------------------------------------------------";

/// 控制日志级别的环境变量, 取值同 `log::LevelFilter` (如 `debug`).
pub const LOG_ENV: &str = "DTI_LOG";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 获取数据根目录.
///
/// 1. 若 `given` 非空, 则返回它;
/// 2. 若环境变量 `$DTI_DATA_DIR` 非空, 则返回其值;
/// 3. 否则, 返回 `$HOME/dataset/dti`.
pub fn data_dir_from_env_or_home(given: Option<PathBuf>) -> Option<PathBuf> {
    given.or_else(dti_berry::dataset::data_dir)
}

/// 由 `-v` 次数得到日志级别: 0 为 `warn`, 1 为 `info`, 2 为 `debug`, 更多为 `trace`.
pub fn level_from_verbosity(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// 初始化日志. `$DTI_LOG` 可以覆盖命令行给出的级别.
///
/// 已经安装过日志器时保留原有的, 返回 `false`.
pub fn init_logger(verbose: u8) -> bool {
    let level = env::var(LOG_ENV)
        .ok()
        .and_then(|v| v.parse::<log::LevelFilter>().ok())
        .unwrap_or_else(|| level_from_verbosity(verbose));
    match simple_logger::SimpleLogger::new().with_level(level).init() {
        Ok(()) => true,
        Err(e) => {
            log::debug!("logger already initialised: {e}");
            false
        }
    }
}
