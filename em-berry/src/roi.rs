//! 限定区域生长范围的 ROI (Region of Interest).
//!
//! ROI 本质上是体素空间上的包含谓词. 正交 (轴对齐盒) ROI
//! 可以完全由提取窗口表达; 非正交 ROI 还需要在提取出的子卷上
//! 以范围外哨兵值遮蔽不属于 ROI 的体素, 使生长无法越过 ROI 表面.

use std::sync::Arc;

use ndarray::Array3;

use crate::data::VoxelBox;
use crate::{Idx3d, Spacing};

/// 共享 ROI 句柄. 撤销命令与过滤器之间以 `Arc` 身份比较判断
/// "同一个 ROI", 深拷贝通过 [`Roi::clone_roi`] 显式进行.
pub type RoiPtr = Arc<dyn Roi>;

/// 体素空间包含谓词.
pub trait Roi: Send + Sync {
    /// ROI 的体素包围盒. 允许超出通道范围, 由调用方负责求交.
    fn extent(&self) -> VoxelBox;

    /// 判断全局体素索引 `pos` 是否属于 ROI.
    fn contains(&self, pos: Idx3d) -> bool;

    /// ROI 是否恰好是一个轴对齐盒?
    ///
    /// 正交 ROI 的 `contains` 必须与 `extent().contains` 完全一致.
    fn is_orthogonal(&self) -> bool {
        false
    }

    /// 深拷贝.
    fn clone_roi(&self) -> RoiPtr;

    /// 判断世界坐标点 (微米, `[z, h, w]` 顺序) 是否属于 ROI.
    /// 点先按 `spacing` 折算到体素索引, 再走体素谓词.
    fn contains_um(&self, point: [f64; 3], spacing: Spacing) -> bool {
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let v = (point[axis] / spacing[axis]).floor();
            if v < 0.0 {
                return false;
            }
            idx[axis] = v as usize;
        }
        self.contains((idx[0], idx[1], idx[2]))
    }

    /// 将子卷 `sub` 中不属于 ROI 的体素置为哨兵值 `out_value`.
    /// `sub_box` 是子卷在全局索引空间中的范围.
    ///
    /// 对正交 ROI 而言子卷已经是范围交集, 该操作为 no-op.
    fn apply_outside(&self, sub: &mut Array3<u8>, sub_box: &VoxelBox, out_value: u8) {
        if self.is_orthogonal() {
            return;
        }
        for (local, v) in sub.indexed_iter_mut() {
            if !self.contains(sub_box.global(local)) {
                *v = out_value;
            }
        }
    }
}

/// 轴对齐盒 ROI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthogonalRoi {
    extent: VoxelBox,
}

impl OrthogonalRoi {
    /// 直接由体素盒初始化.
    pub fn new(extent: VoxelBox) -> Self {
        Self { extent }
    }

    /// 共享句柄.
    pub fn into_shared(self) -> RoiPtr {
        Arc::new(self)
    }
}

impl Roi for OrthogonalRoi {
    #[inline]
    fn extent(&self) -> VoxelBox {
        self.extent
    }

    #[inline]
    fn contains(&self, pos: Idx3d) -> bool {
        self.extent.contains(pos)
    }

    #[inline]
    fn is_orthogonal(&self) -> bool {
        true
    }

    fn clone_roi(&self) -> RoiPtr {
        Arc::new(self.clone())
    }
}

/// 世界坐标球形 ROI (非正交 ROI 的参考实现).
#[derive(Debug, Clone, PartialEq)]
pub struct SphereRoi {
    /// 球心, 以微米为单位, `[z, h, w]` 顺序.
    center_um: [f64; 3],

    /// 半径, 以微米为单位.
    radius_um: f64,

    spacing: Spacing,
}

impl SphereRoi {
    /// 直接初始化. `radius_um` 必须为正, `spacing` 各分量必须为正,
    /// 否则程序 panic.
    pub fn new(center_um: [f64; 3], radius_um: f64, spacing: Spacing) -> Self {
        assert!(radius_um > 0.0, "球半径必须为正");
        assert!(spacing.iter().all(|s| *s > 0.0), "体素分辨率必须为正");
        Self {
            center_um,
            radius_um,
            spacing,
        }
    }

    /// 共享句柄.
    pub fn into_shared(self) -> RoiPtr {
        Arc::new(self)
    }

    /// 体素 `pos` 的中心到球心的欧氏距离的平方, 单位为 (µm)^2.
    #[inline]
    fn center_distance_to_squared(&self, pos: Idx3d) -> f64 {
        let p = crate::voxel_center_um(pos, self.spacing);
        (0..3).map(|a| (p[a] - self.center_um[a]).powi(2)).sum()
    }
}

impl Roi for SphereRoi {
    fn extent(&self) -> VoxelBox {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for axis in 0..3 {
            let l = (self.center_um[axis] - self.radius_um) / self.spacing[axis];
            let h = (self.center_um[axis] + self.radius_um) / self.spacing[axis];
            lo[axis] = l.floor().max(0.0) as usize;
            hi[axis] = h.floor().max(0.0) as usize;
        }
        VoxelBox::new((lo[0], lo[1], lo[2]), (hi[0], hi[1], hi[2]))
    }

    #[inline]
    fn contains(&self, pos: Idx3d) -> bool {
        self.center_distance_to_squared(pos) <= self.radius_um.powi(2)
    }

    fn clone_roi(&self) -> RoiPtr {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_orthogonal_roi() {
        let roi = OrthogonalRoi::new(VoxelBox::new((0, 0, 0), (10, 10, 10)));
        assert!(roi.is_orthogonal());
        assert!(roi.contains((10, 10, 10)));
        assert!(!roi.contains((11, 0, 0)));
        assert!(roi.contains_um([10.5, 0.5, 0.5], [1.0; 3]));
        assert!(!roi.contains_um([11.5, 0.5, 0.5], [1.0; 3]));
    }

    #[test]
    fn test_sphere_roi_extent_and_contains() {
        let roi = SphereRoi::new([5.0, 5.0, 5.0], 3.0, [1.0; 3]);
        assert!(!roi.is_orthogonal());
        assert_eq!(roi.extent(), VoxelBox::new((2, 2, 2), (8, 8, 8)));
        // 球心体素
        assert!(roi.contains((4, 4, 4)));
        // 包围盒角落在球外
        assert!(!roi.contains((2, 2, 2)));
    }

    #[test]
    fn test_sphere_roi_near_origin_clamps() {
        let roi = SphereRoi::new([1.0, 1.0, 1.0], 5.0, [1.0; 3]);
        assert_eq!(roi.extent().min(), (0, 0, 0));
    }

    #[test]
    fn test_apply_outside_sentinel() {
        let roi = SphereRoi::new([2.0, 2.0, 2.0], 1.5, [1.0; 3]);
        let bx = VoxelBox::new((0, 0, 0), (3, 3, 3));
        let mut sub = Array3::from_elem(bx.shape(), 100u8);
        roi.apply_outside(&mut sub, &bx, 222);

        // 球心保持原值, 角落被遮蔽
        assert_eq!(sub[(1, 1, 1)], 100);
        assert_eq!(sub[(0, 0, 0)], 222);
        assert_eq!(sub[(3, 3, 3)], 222);
    }

    #[test]
    fn test_apply_outside_noop_for_orthogonal() {
        let roi = OrthogonalRoi::new(VoxelBox::new((0, 0, 0), (1, 1, 1)));
        let bx = VoxelBox::new((0, 0, 0), (3, 3, 3));
        let mut sub = Array3::from_elem(bx.shape(), 100u8);
        roi.apply_outside(&mut sub, &bx, 222);
        assert!(sub.iter().all(|&v| v == 100));
    }
}
