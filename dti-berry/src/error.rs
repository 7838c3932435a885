//! 运行时错误.

use std::path::PathBuf;

/// 本 crate 所有可失败操作的统一错误类型.
#[derive(Debug, thiserror::Error)]
pub enum DtiError {
    /// 底层 I/O 错误.
    #[error("I/O 错误 `{path}`: {source}")]
    Io {
        /// 出错的文件或目录.
        path: PathBuf,

        /// 原始错误.
        #[source]
        source: std::io::Error,
    },

    /// nifti 文件读取错误.
    #[error("无法读取 nifti 文件 `{path}`: {source}")]
    Nifti {
        /// 出错的文件.
        path: PathBuf,

        /// 原始错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// 图像编码/保存错误.
    #[error("无法保存图像 `{path}`: {source}")]
    Image {
        /// 目标文件.
        path: PathBuf,

        /// 原始错误.
        #[source]
        source: image::ImageError,
    },

    /// 文本文件解析错误. `line` 从 1 开始计数.
    #[error("解析 `{path}` 第 {line} 行失败: {reason}")]
    Parse {
        /// 出错的文件.
        path: PathBuf,

        /// 行号.
        line: usize,

        /// 原因.
        reason: String,
    },

    /// 配置文件错误.
    #[error("配置文件 `{path}` 无效: {source}")]
    Config {
        /// 配置文件.
        path: PathBuf,

        /// 原始错误.
        #[source]
        source: toml::de::Error,
    },

    /// 数组形状不符合要求.
    #[error("形状不匹配: 期望 {expected:?}, 实际 {found:?}")]
    Shape {
        /// 期望形状.
        expected: Vec<usize>,

        /// 实际形状.
        found: Vec<usize>,
    },

    /// 输入为空 (空列表, 空矩阵, 空日志 ...).
    #[error("输入为空: {0}")]
    Empty(String),

    /// 找不到需要的文件.
    #[error("找不到文件: {0}")]
    Missing(String),

    /// 参数取值不合法.
    #[error("参数不合法: {0}")]
    InvalidArgument(String),
}

/// 统一的 `Result` 别名.
pub type DtiResult<T> = Result<T, DtiError>;

impl DtiError {
    /// 包装 `std::io::Error`, 并附带出错路径.
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 包装图像保存错误.
    pub(crate) fn image<P: Into<PathBuf>>(path: P, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    /// 构造解析错误.
    pub(crate) fn parse<P: Into<PathBuf>, S: Into<String>>(path: P, line: usize, reason: S) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
