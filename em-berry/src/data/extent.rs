//! 体素空间的轴对齐盒.

use crate::{Idx3d, Spacing};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 体素索引空间中的闭区间轴对齐盒. `min` 与 `max` 两端均为包含语义.
///
/// 该结构是本 crate 的 "Bounds" 表示: 提取窗口、分割卷范围、
/// 编辑区列表均以它表达. 世界坐标仅在需要时结合 [`Spacing`] 换算.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoxelBox {
    min: Idx3d,
    max: Idx3d,
}

impl VoxelBox {
    /// 直接初始化. 如果任一维度 `min > max` 则程序 panic.
    pub fn new(min: Idx3d, max: Idx3d) -> Self {
        assert!(
            min.0 <= max.0 && min.1 <= max.1 && min.2 <= max.2,
            "非法盒范围: {min:?} > {max:?}"
        );
        Self { min, max }
    }

    /// 覆盖形状为 `(z, h, w)` 的整个体数据的盒. 形状各维必须非零.
    #[inline]
    pub fn from_shape((z, h, w): Idx3d) -> Self {
        assert!(z != 0 && h != 0 && w != 0, "形状不能含零维");
        Self::new((0, 0, 0), (z - 1, h - 1, w - 1))
    }

    /// 以 `center` 为中心, 每维半边长为 `half` 的盒, 并钳制到 `clamp` 内.
    pub fn around(center: Idx3d, half: [usize; 3], clamp: &VoxelBox) -> Self {
        let lo = (
            center.0.saturating_sub(half[0]).max(clamp.min.0),
            center.1.saturating_sub(half[1]).max(clamp.min.1),
            center.2.saturating_sub(half[2]).max(clamp.min.2),
        );
        let hi = (
            center.0.saturating_add(half[0]).min(clamp.max.0),
            center.1.saturating_add(half[1]).min(clamp.max.1),
            center.2.saturating_add(half[2]).min(clamp.max.2),
        );
        Self::new(lo, hi)
    }

    /// 盒的下界 (包含).
    #[inline]
    pub fn min(&self) -> Idx3d {
        self.min
    }

    /// 盒的上界 (包含).
    #[inline]
    pub fn max(&self) -> Idx3d {
        self.max
    }

    /// 第 `axis` 维的下界. `axis` 取 `0..3`, 越界时 panic.
    #[inline]
    pub fn axis_min(&self, axis: usize) -> usize {
        match axis {
            0 => self.min.0,
            1 => self.min.1,
            2 => self.min.2,
            _ => panic!("非法轴编号: {axis}"),
        }
    }

    /// 第 `axis` 维的上界. `axis` 取 `0..3`, 越界时 panic.
    #[inline]
    pub fn axis_max(&self, axis: usize) -> usize {
        match axis {
            0 => self.max.0,
            1 => self.max.1,
            2 => self.max.2,
            _ => panic!("非法轴编号: {axis}"),
        }
    }

    /// 盒的形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.max.0 - self.min.0 + 1,
            self.max.1 - self.min.1 + 1,
            self.max.2 - self.min.2 + 1,
        )
    }

    /// 盒内体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 判断全局索引 `pos` 是否位于盒内.
    #[inline]
    pub fn contains(&self, pos: Idx3d) -> bool {
        self.min.0 <= pos.0
            && pos.0 <= self.max.0
            && self.min.1 <= pos.1
            && pos.1 <= self.max.1
            && self.min.2 <= pos.2
            && pos.2 <= self.max.2
    }

    /// 判断 `other` 是否完全被 `self` 包含.
    #[inline]
    pub fn encloses(&self, other: &VoxelBox) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// 求两盒交集. 不相交时返回 `None`.
    pub fn intersection(&self, other: &VoxelBox) -> Option<VoxelBox> {
        let lo = (
            self.min.0.max(other.min.0),
            self.min.1.max(other.min.1),
            self.min.2.max(other.min.2),
        );
        let hi = (
            self.max.0.min(other.max.0),
            self.max.1.min(other.max.1),
            self.max.2.min(other.max.2),
        );
        (lo.0 <= hi.0 && lo.1 <= hi.1 && lo.2 <= hi.2).then(|| VoxelBox::new(lo, hi))
    }

    /// 将全局索引转换为相对于 `self.min` 的局部索引.
    ///
    /// 如果 `pos` 不在盒内, 则程序 panic.
    #[inline]
    pub fn local(&self, pos: Idx3d) -> Idx3d {
        assert!(self.contains(pos), "索引 {pos:?} 不在 {self:?} 内");
        (pos.0 - self.min.0, pos.1 - self.min.1, pos.2 - self.min.2)
    }

    /// 将相对于 `self.min` 的局部索引转换为全局索引.
    #[inline]
    pub fn global(&self, local: Idx3d) -> Idx3d {
        (
            local.0 + self.min.0,
            local.1 + self.min.1,
            local.2 + self.min.2,
        )
    }

    /// 盒的世界坐标范围, 以微米为单位, 格式为
    /// `[z_min, z_max, h_min, h_max, w_min, w_max]`.
    /// 下边取体素下缘, 上边取体素上缘.
    pub fn bounds_um(&self, spacing: Spacing) -> [f64; 6] {
        [
            self.min.0 as f64 * spacing[0],
            (self.max.0 + 1) as f64 * spacing[0],
            self.min.1 as f64 * spacing[1],
            (self.max.1 + 1) as f64 * spacing[1],
            self.min.2 as f64 * spacing[2],
            (self.max.2 + 1) as f64 * spacing[2],
        ]
    }
}
