//! 通用常量.

/// 预处理目录中的约定文件名.
pub mod files {
    /// 涡流校正后的 4D DWI 数据.
    pub const DTI_EC: &str = "dti_ec.nii.gz";

    /// 涡流校正后的第一个 (b0) 体积.
    pub const DTI_EC_VOL0: &str = "dti_ec_00.nii.gz";

    /// 脑掩膜 (QA 报告使用).
    pub const BRAIN_MASK: &str = "dti_ec_brain_mask.nii.gz";

    /// 去颅骨后的脑图 (连接矩阵计算使用, 非零即脑内).
    pub const BRAIN: &str = "dti_ec_brain.nii.gz";

    /// 白质掩膜.
    pub const WM_MASK: &str = "whitematter_mask.nii.gz";

    /// b 值文件.
    pub const BVALS: &str = "bvals";

    /// 梯度方向文件.
    pub const BVECS: &str = "bvecs";

    /// dtifit 的 FA 输出 (glob 模式).
    pub const FA_GLOB: &str = "*_FA.nii.gz";

    /// dtifit 的 MO 输出 (glob 模式).
    pub const MO_GLOB: &str = "*_MO.nii.gz";

    /// dtifit 的 SSE 输出 (glob 模式).
    pub const SSE_GLOB: &str = "*_sse.nii.gz";

    /// 每个体积的绝对/相对位移 (mm).
    pub const EC_DISP: &str = "ec_disp.txt";

    /// 仅 b0 体积的位移.
    pub const EC_DISP_B0: &str = "ec_disp_b0.txt";

    /// 仅扩散加权体积的位移.
    pub const EC_DISP_NOTB0: &str = "ec_disp_notb0.txt";

    /// 每个体积的旋转角 (弧度).
    pub const EC_ROT: &str = "ec_rot.txt";

    /// 每个体积的平移 (mm).
    pub const EC_TRANS: &str = "ec_trans.txt";

    /// QA 输出子目录.
    pub const QA_DIR: &str = "QA_OUTPUT";

    /// QA 报告文件名.
    pub const QA_REPORT: &str = "QAReport.jpg";

    /// 连接矩阵输出子目录.
    pub const CONNECTIVITY_DIR: &str = "CONNECTIVITY";
}

/// 位移文件中表示缺失值的记号.
pub const NA_TOKEN: &str = ".";

/// 行为学表格中表示缺失值的约定数值.
pub const MISSING_CODE: f64 = 999.0;

/// rmsdiff 所用球体半径 (mm).
pub const RMS_RADIUS_MM: f64 = 80.0;

/// b 值不超过该值的体积视为 b0.
pub const B0_THRESHOLD: f64 = 0.0;

/// 箱线图须的默认长度 (以 IQR 为单位).
pub const WHISKER: f64 = 1.5;

/// 常用 RGB 颜色.
pub mod rgb {
    /// 黑色.
    pub const BLACK: [u8; 3] = [0, 0, 0];

    /// 白色.
    pub const WHITE: [u8; 3] = [255, 255, 255];

    /// 灰色.
    pub const GRAY: [u8; 3] = [128, 128, 128];

    /// 亮灰色, 用作面板网格.
    pub const LIGHT_GRAY: [u8; 3] = [220, 220, 220];

    /// 直方图默认颜色 (`#3670f1`).
    pub const HIST_BLUE: [u8; 3] = [0x36, 0x70, 0xf1];

    /// 绿色.
    pub const GREEN: [u8; 3] = [0, 128, 0];

    /// 橙色.
    pub const ORANGE: [u8; 3] = [255, 165, 0];

    /// 红色.
    pub const RED: [u8; 3] = [255, 0, 0];

    /// 蓝色.
    pub const BLUE: [u8; 3] = [31, 119, 180];

    /// 时间序列第二条线的颜色.
    pub const SECOND: [u8; 3] = [255, 127, 14];

    /// 时间序列第三条线的颜色.
    pub const THIRD: [u8; 3] = [44, 160, 44];
}
