#![warn(missing_docs)]

//! 核心库. 提供 DTI (弥散张量成像) 预处理结果的质量控制与后处理算法.
//!
//! 所有操作都遵循同一模式: 读取外部工具 (FSL `eddy_correct`, `dtifit`, 纤维追踪)
//! 生成的中间结果 → 计算简单统计量 → 保存图像或文本文件.
//! 本 crate 不做张量拟合和纤维追踪, 它们属于被包装的工具链.
//!
//! # 注意
//!
//! 1. 体数据均按 FSL / nibabel 的 `(x, y, z)` 顺序访问.
//! 2. 图像中不绘制任何文字; 标注信息写入同名 `.txt` 旁注文件.
//!
//! # 开发计划
//!
//! ### 涡流校正头动估计 ✅
//!
//! 解析 `.ecclog`, 计算 rms 位移 (绝对/相对), 旋转与平移, 并按 b 值拆分.
//!
//! 实现位于 `dti-berry/src/motion`.
//!
//! ### 队列头动 QC ✅
//!
//! 汇总所有被试的位移统计量, 箱线图标记离群被试.
//!
//! 实现位于 `dti-berry/src/qc.rs`.
//!
//! ### 单被试 QA 报告 ✅
//!
//! b0/脑掩膜拼图, 头动曲线, FA/白质掩膜拼图, FA/MO/SSE 直方图.
//!
//! 实现位于 `dti-berry/src/report.rs`.
//!
//! ### 种子点与连接矩阵 ✅
//!
//! 1. 掩膜内均匀撒种子点, 并将越界种子点推回或删除. ✅
//! 2. 根据纤维端点所在分区统计对称/有向连接矩阵. ✅
//!
//! 实现位于 `dti-berry/src/tracking`.
//!
//! ### 连接矩阵后处理 ✅
//!
//! 按 cost 阈值化 (并列值随机取舍), 求平均, 权重直方图.
//!
//! 实现位于 `dti-berry/src/matrix.rs`.
//!
//! ### FSL randomise 设计文件 ✅
//!
//! `.mat`/`.con`/`.fts` 写出, 析因设计, 相关与 t 检验设计的批量生成与去重.
//!
//! 实现位于 `dti-berry/src/glm`.
//!
//! ### 3D 头动曲面图 ❌
//!
//! 以 "被试 × 体积" 的 2D 热图代替.

/// 三维索引, 按 `(x, y, z)` 顺序.
pub type Idx3d = (usize, usize, usize);

pub mod consts;
mod error;

pub use error::{DtiError, DtiResult};

pub mod dataset;
pub mod glm;
pub mod matrix;
pub mod motion;
pub mod plot;
pub mod qc;
pub mod report;
pub mod stats;
pub mod text;
pub mod tracking;
pub mod volume;

pub use volume::{DtiVolume, NiftiHeaderAttr};

pub mod prelude;
