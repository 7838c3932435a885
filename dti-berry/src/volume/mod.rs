//! nii 格式的 3D 标量图 (b0, FA, MO, SSE, 各类掩膜与分区图).
//!
//! 与 FSL / nibabel 的约定一致, 数据按 `(x, y, z)` 顺序索引, 第一维为左右方向.
//! 4D 文件只读取第一个体积.

use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis, Ix3, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::motion::Affine;
use crate::{DtiError, DtiResult, Idx3d};

mod plane;

pub use plane::{montage_slices, plane, Orientation};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// nii header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取 `(x, y, z)` 三个方向的体素个数.
    #[inline]
    fn shape(&self) -> Idx3d {
        let [_, x, y, z, ..] = self.header().dim;
        (x as usize, y as usize, z as usize)
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (x, y, z) = self.shape();
        x * y * z
    }

    /// 获取单个体素分辨率 (毫米), 按 `(x, y, z)` 顺序.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 体素坐标到世界坐标 (mm) 的仿射变换.
    ///
    /// `sform_code > 0` 时取 `srow_*`, 否则仅按体素分辨率缩放.
    fn affine(&self) -> Affine {
        let h = self.header();
        if h.sform_code > 0 {
            let row = |r: [f32; 4]| r.map(|v| v as f64);
            Affine([row(h.srow_x), row(h.srow_y), row(h.srow_z), [0.0, 0.0, 0.0, 1.0]])
        } else {
            let [x, y, z] = self.pix_dim().map(|v| if v > 0.0 { v } else { 1.0 });
            Affine([
                [x, 0.0, 0.0, 0.0],
                [0.0, y, 0.0, 0.0],
                [0.0, 0.0, z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ])
        }
    }
}

/// nii 格式 3D 标量图, 包括 header 和体素值. 体素值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct DtiVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for DtiVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for DtiVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl DtiVolume {
    /// 打开 nii 文件. 3D 文件直接读取, 4D 文件只保留第一个体积.
    pub fn open<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        let nifti_err = |source| DtiError::Nifti {
            path: path.to_owned(),
            source,
        };
        let obj = ReaderOptions::new().read_file(path).map_err(nifti_err)?;
        let mut header = Box::new(obj.header().clone());
        let data = obj.into_volume().into_ndarray::<f32>().map_err(nifti_err)?;

        let data = match data.ndim() {
            3 => data,
            4 => data.index_axis_move(Axis(3), 0),
            _ => {
                return Err(DtiError::Shape {
                    expected: vec![0, 0, 0],
                    found: data.shape().to_vec(),
                })
            }
        };
        let found = data.shape().to_vec();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| DtiError::Shape {
                expected: vec![0, 0, 0],
                found,
            })?;

        // 4D 文件的 header 仍然描述 4 个维度, 这里同步为 3D.
        let (x, y, z) = data.dim();
        header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
        Ok(Self { header, data })
    }

    /// 由数据和体素分辨率直接创建, 不携带空间变换信息 (`sform_code = 0`).
    pub fn from_array(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let (x, y, z) = data.dim();
        header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
        let [_, px, py, pz, ..] = &mut header.pixdim;
        (*px, *py, *pz) = (pix_dim[0], pix_dim[1], pix_dim[2]);
        Self { header, data }
    }

    /// 沿用 `self` 的 header, 替换数据. 形状必须一致.
    pub fn with_data(&self, data: Array3<f32>) -> DtiResult<Self> {
        self.check_shape(&data.view())?;
        Ok(Self {
            header: self.header.clone(),
            data,
        })
    }

    fn check_shape(&self, other: &ArrayView3<f32>) -> DtiResult<()> {
        if self.data.dim() != other.dim() {
            return Err(DtiError::Shape {
                expected: self.data.shape().to_vec(),
                found: other.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// 保存为 nii (`.nii` 或 `.nii.gz`) 文件, header 沿用原文件.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DtiResult<()> {
        let path = path.as_ref();
        crate::text::ensure_parent(path)?;
        WriterOptions::new(path)
            .reference_header(&self.header)
            .write_nifti(&self.data)
            .map_err(|source| DtiError::Nifti {
                path: path.to_owned(),
                source,
            })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 取出数据.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    /// 最大体素值. 空体积返回 `None`.
    pub fn max(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    /// 二值化: 大于 0 的体素置 1, 其余置 0.
    pub fn binarize(&self) -> Self {
        Self {
            header: self.header.clone(),
            data: self.data.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }

    /// 逐体素乘以 `mask`. 形状不一致时返回 `Err`.
    pub fn masked(&self, mask: &DtiVolume) -> DtiResult<Self> {
        self.check_shape(&mask.data())?;
        Ok(Self {
            header: self.header.clone(),
            data: &self.data * &mask.data,
        })
    }

    /// 除以最大值, 使数据落在 `[.., 1]` 区间. 最大值不为正时原样返回.
    pub fn normalized(&self) -> Self {
        let data = match self.max() {
            Some(m) if m > 0.0 => self.data.mapv(|v| v / m),
            _ => self.data.clone(),
        };
        Self {
            header: self.header.clone(),
            data,
        }
    }

    /// 非零体素个数.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }

    /// 以体素值为权重的质心, 单位为毫米 (体素坐标乘以分辨率).
    ///
    /// 所有体素权重之和为 0 时返回 `None`.
    pub fn centre_of_mass(&self) -> Option<[f64; 3]> {
        let mut sum = [0.0f64; 3];
        let mut total = 0.0f64;
        for ((x, y, z), &v) in self.data.indexed_iter() {
            let v = v as f64;
            sum[0] += v * x as f64;
            sum[1] += v * y as f64;
            sum[2] += v * z as f64;
            total += v;
        }
        if total == 0.0 {
            return None;
        }
        let pd = self.pix_dim();
        Some([0, 1, 2].map(|i| sum[i] / total * pd[i]))
    }

    /// 收集 `where_positive` 中大于 0 的位置上的体素值.
    pub fn values_where(&self, where_positive: &DtiVolume) -> DtiResult<Vec<f32>> {
        self.check_shape(&where_positive.data())?;
        let mut ans = Vec::new();
        Zip::from(&self.data)
            .and(&where_positive.data)
            .for_each(|&v, &w| {
                if w > 0.0 {
                    ans.push(v);
                }
            });
        Ok(ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn cube() -> DtiVolume {
        let mut data = Array3::<f32>::zeros((4, 3, 2));
        data[(1, 1, 0)] = 2.0;
        data[(3, 1, 1)] = 2.0;
        DtiVolume::from_array(data, [2.0, 2.0, 3.0])
    }

    #[test]
    fn test_header_attr() {
        let v = cube();
        assert_eq!(v.shape(), (4, 3, 2));
        assert_eq!(v.size(), 24);
        assert_eq!(v.voxel(), 12.0);
        let a = v.affine();
        assert_eq!(a.apply([1.0, 1.0, 1.0]), [2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_centre_of_mass() {
        let com = cube().centre_of_mass().unwrap();
        assert_eq!(com, [4.0, 2.0, 1.5]);
        let empty = DtiVolume::from_array(Array3::zeros((2, 2, 2)), [1.0; 3]);
        assert!(empty.centre_of_mass().is_none());
    }

    #[test]
    fn test_binarize_normalize_mask() {
        let v = cube();
        let b = v.binarize();
        assert_eq!(b.count_nonzero(), 2);
        assert_eq!(b.max(), Some(1.0));
        assert_eq!(v.normalized().max(), Some(1.0));

        let masked = v.masked(&b).unwrap();
        assert_eq!(masked[(1, 1, 0)], 2.0);

        let other = DtiVolume::from_array(Array3::zeros((1, 1, 1)), [1.0; 3]);
        assert!(matches!(v.masked(&other), Err(DtiError::Shape { .. })));
    }

    #[test]
    fn test_values_where() {
        let v = cube();
        let mut mask = Array3::<f32>::zeros((4, 3, 2));
        mask[(1, 1, 0)] = 1.0;
        mask[(0, 0, 0)] = 1.0;
        let mask = DtiVolume::from_array(mask, [1.0; 3]);
        let mut got = v.values_where(&mask).unwrap();
        got.sort_by(f32::total_cmp);
        assert_eq!(got, vec![0.0, 2.0]);
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("vol.nii");
        let v = cube();
        v.save(&p).unwrap();
        let back = DtiVolume::open(&p).unwrap();
        assert_eq!(back.shape(), (4, 3, 2));
        assert_eq!(back[(1, 1, 0)], 2.0);
        assert_eq!(back[(3, 1, 1)], 2.0);
        assert_eq!(back.pix_dim(), [2.0, 2.0, 3.0]);
    }
}
