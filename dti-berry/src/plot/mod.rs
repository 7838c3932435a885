//! 图像绘制与保存.
//!
//! 所有图都直接画在 `image::RgbImage` 上并保存到磁盘, 不包含文字;
//! 需要标注的信息 (离群被试编号, cost 等) 由调用方写入同名的 `.txt` 旁注文件.

mod boxplot;
mod canvas;
mod colormap;
mod heatmap;
mod hist;
mod panel;
mod series;

pub use boxplot::{boxplot_figure, draw_boxes_into, ColoredFlier};
pub use canvas::{Canvas, Rect};
pub use colormap::{palette, parse_color, Colormap};
pub use heatmap::{cell_for, draw_colorbar, draw_matrix, heatmap, ColorRange};
pub use hist::Histogram;
pub use panel::Panel;
pub use series::{draw_series_into, time_series_figure, Series};

/// 单幅图的默认尺寸 (像素).
pub const FIGURE_SIZE: (u32, u32) = (600, 600);

/// 时间序列图的默认尺寸 (像素), 与 `fsl_tsplot` 的默认比例相近.
pub const TS_FIGURE_SIZE: (u32, u32) = (600, 150);
