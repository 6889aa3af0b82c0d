//! 分割输出卷与其读写锁封装.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndarray::{s, Array3, ArrayView3};

use super::{GridAttr, VoxelBox};
use crate::consts::mask::*;
use crate::{Idx3d, Spacing};

/// 过滤器发布的分割掩膜卷.
///
/// 卷只覆盖掩膜的最小包围盒, `origin` 记录它在通道全局索引空间中的偏移.
/// 手工编辑通过 [`Self::draw_value`] 进入, 同时登记编辑区;
/// undo 恢复路径通过 [`Self::resize`] + [`Self::draw`] +
/// [`Self::set_edited_regions`] 按字节回填.
#[derive(Debug, Clone, PartialEq)]
pub struct SegVolume {
    data: Array3<u8>,
    origin: Idx3d,
    spacing: Spacing,
    edited: Vec<VoxelBox>,
}

impl GridAttr for SegVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        let &[z, h, w] = self.data.shape() else {
            unreachable!()
        };
        (z, h, w)
    }

    #[inline]
    fn spacing(&self) -> Spacing {
        self.spacing
    }
}

impl SegVolume {
    /// 直接由掩膜数据和全局偏移初始化. 编辑区列表为空.
    pub fn new(data: Array3<u8>, origin: Idx3d, spacing: Spacing) -> Self {
        assert!(spacing.iter().all(|s| *s > 0.0), "体素分辨率必须为正");
        Self {
            data,
            origin,
            spacing,
            edited: Vec::new(),
        }
    }

    /// 构造零体素的空卷. 空卷是合法的退化结果
    /// (例如种子不在提取窗口内时的输出).
    pub fn empty(spacing: Spacing) -> Self {
        Self::new(Array3::zeros((0, 0, 0)), (0, 0, 0), spacing)
    }

    /// 该卷是否不含任何体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 卷在全局索引空间中的范围. 空卷返回 `None`.
    pub fn extent(&self) -> Option<VoxelBox> {
        if self.is_empty() {
            return None;
        }
        let (z, h, w) = self.shape();
        Some(VoxelBox::new(
            self.origin,
            (
                self.origin.0 + z - 1,
                self.origin.1 + h - 1,
                self.origin.2 + w - 1,
            ),
        ))
    }

    /// 获取全局索引 `pos` 处的掩膜值. 卷范围外返回 `None`.
    pub fn get(&self, pos: Idx3d) -> Option<u8> {
        let bx = self.extent()?;
        bx.contains(pos).then(|| self.data[bx.local(pos)])
    }

    /// 获得掩膜数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 统计前景体素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().copied().filter(|p| is_foreground(*p)).count()
    }

    /// 前景体素的实际总体积, 以立方微米为单位.
    #[inline]
    pub fn foreground_um3(&self) -> f64 {
        self.count_foreground() as f64 * self.voxel_um3()
    }

    /// 将卷调整到新的范围 `bx`. 与旧范围重叠的体素内容被保留,
    /// 新增体素填充为背景. 编辑区列表被钳制到新范围内
    /// (完全落在范围外的编辑区被丢弃).
    pub fn resize(&mut self, bx: VoxelBox) {
        let mut data = Array3::from_elem(bx.shape(), SEG_BG_VALUE);
        if let Some(old) = self.extent() {
            if let Some(overlap) = old.intersection(&bx) {
                let (sz, sh, sw) = overlap.shape();
                let src0 = old.local(overlap.min());
                let dst0 = bx.local(overlap.min());
                let src = self.data.slice(s![
                    src0.0..src0.0 + sz,
                    src0.1..src0.1 + sh,
                    src0.2..src0.2 + sw
                ]);
                data.slice_mut(s![
                    dst0.0..dst0.0 + sz,
                    dst0.1..dst0.1 + sh,
                    dst0.2..dst0.2 + sw
                ])
                .assign(&src);
            }
        }
        self.data = data;
        self.origin = bx.min();
        self.edited = self
            .edited
            .iter()
            .filter_map(|r| r.intersection(&bx))
            .collect();
    }

    /// 将 `src` 卷的内容绘制到 `self` 上 (按全局索引对齐, 覆盖重叠部分的
    /// 全部字节). 重叠区域被登记为编辑区.
    ///
    /// 与 `self` 范围不重叠的部分被忽略.
    pub fn draw(&mut self, src: &SegVolume) {
        let (Some(dst_bx), Some(src_bx)) = (self.extent(), src.extent()) else {
            return;
        };
        let Some(overlap) = dst_bx.intersection(&src_bx) else {
            return;
        };
        let (sz, sh, sw) = overlap.shape();
        let s0 = src_bx.local(overlap.min());
        let d0 = dst_bx.local(overlap.min());
        let view = src
            .data
            .slice(s![s0.0..s0.0 + sz, s0.1..s0.1 + sh, s0.2..s0.2 + sw]);
        self.data
            .slice_mut(s![d0.0..d0.0 + sz, d0.1..d0.1 + sh, d0.2..d0.2 + sw])
            .assign(&view);
        self.edited.push(overlap);
    }

    /// 将范围 `bx` 内的体素全部置为 `value`, 并登记编辑区 (手工涂改入口).
    ///
    /// 如果 `bx` 不完全位于卷范围内, 则程序 panic.
    pub fn draw_value(&mut self, bx: VoxelBox, value: u8) {
        let extent = self.extent().expect("不能在空卷上绘制");
        assert!(extent.encloses(&bx), "绘制范围 {bx:?} 越界");
        let (sz, sh, sw) = bx.shape();
        let d0 = extent.local(bx.min());
        self.data
            .slice_mut(s![d0.0..d0.0 + sz, d0.1..d0.1 + sh, d0.2..d0.2 + sw])
            .fill(value);
        self.edited.push(bx);
    }

    /// 获取编辑区列表.
    #[inline]
    pub fn edited_regions(&self) -> &[VoxelBox] {
        &self.edited
    }

    /// 整体覆写编辑区列表 (undo/redo 交换路径).
    ///
    /// 列表中每个区域都必须落在卷范围内, 否则程序 panic.
    pub fn set_edited_regions(&mut self, regions: Vec<VoxelBox>) {
        if !regions.is_empty() {
            let extent = self.extent().expect("空卷不能持有编辑区");
            assert!(
                regions.iter().all(|r| extent.encloses(r)),
                "编辑区越出卷范围"
            );
        }
        self.edited = regions;
    }

    /// 自上次自动计算以来, 该卷是否被手工编辑过?
    #[inline]
    pub fn is_edited(&self) -> bool {
        !self.edited.is_empty()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::Axis;
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl SegVolume {
    /// 借助 `rayon`, 并行统计前景体素个数.
    pub fn par_count_foreground(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.data
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|sli| sli.iter().copied().filter(|p| is_foreground(*p)).count())
            .sum()
    }
}

/// 过滤器的单输出槽 (id 0).
///
/// `Ready` 状态下多个消费者可以并发读; 手工编辑与 undo
/// 恢复等写路径必须独占写锁. 快照总是从读锁内 deepcopy,
/// 绝不与活动卷共享缓冲.
#[derive(Debug)]
pub struct Output {
    volume: RwLock<SegVolume>,
}

impl Output {
    /// 以初始卷建立输出槽.
    pub fn new(volume: SegVolume) -> Self {
        Self {
            volume: RwLock::new(volume),
        }
    }

    /// 获取读锁.
    pub fn read(&self) -> RwLockReadGuard<'_, SegVolume> {
        // 锁毒化仅在持锁线程 panic 后出现, 此处直接传播 panic.
        self.volume.read().unwrap()
    }

    /// 获取写锁.
    pub fn write(&self) -> RwLockWriteGuard<'_, SegVolume> {
        self.volume.write().unwrap()
    }

    /// 用新卷整体替换输出 (成功重算后的发布路径).
    pub fn replace(&self, volume: SegVolume) {
        *self.write() = volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(bx: VoxelBox) -> SegVolume {
        SegVolume::new(
            Array3::from_elem(bx.shape(), SEG_VOXEL_VALUE),
            bx.min(),
            [1.0; 3],
        )
    }

    #[test]
    fn test_empty_volume() {
        let v = SegVolume::empty([1.0; 3]);
        assert!(v.is_empty());
        assert!(v.extent().is_none());
        assert_eq!(v.count_foreground(), 0);
        assert!(!v.is_edited());
        assert_eq!(v.get((0, 0, 0)), None);
    }

    #[test]
    fn test_draw_value_records_edited_region() {
        let mut v = solid(VoxelBox::new((0, 0, 0), (9, 9, 9)));
        assert!(!v.is_edited());

        let patch = VoxelBox::new((1, 1, 1), (1, 1, 9));
        v.draw_value(patch, SEG_BG_VALUE);
        assert!(v.is_edited());
        assert_eq!(v.edited_regions(), &[patch]);
        assert_eq!(v.get((1, 1, 5)), Some(SEG_BG_VALUE));
        assert_eq!(v.get((2, 1, 5)), Some(SEG_VOXEL_VALUE));
        assert_eq!(v.count_foreground(), 1000 - 9);
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut v = solid(VoxelBox::new((2, 2, 2), (5, 5, 5)));
        v.resize(VoxelBox::new((0, 0, 0), (5, 5, 5)));
        assert_eq!(v.extent(), Some(VoxelBox::new((0, 0, 0), (5, 5, 5))));
        // 旧内容保留
        assert_eq!(v.get((2, 2, 2)), Some(SEG_VOXEL_VALUE));
        // 新增部分为背景
        assert_eq!(v.get((0, 0, 0)), Some(SEG_BG_VALUE));
    }

    #[test]
    fn test_resize_clamps_edited_regions() {
        let mut v = solid(VoxelBox::new((0, 0, 0), (9, 9, 9)));
        v.draw_value(VoxelBox::new((0, 0, 0), (9, 9, 0)), SEG_BG_VALUE);
        v.resize(VoxelBox::new((5, 5, 0), (9, 9, 9)));
        assert_eq!(
            v.edited_regions(),
            &[VoxelBox::new((5, 5, 0), (9, 9, 0))]
        );
    }

    #[test]
    fn test_draw_restores_bytes() {
        let mut v = solid(VoxelBox::new((0, 0, 0), (4, 4, 4)));
        let backup = v.clone();

        v.draw_value(VoxelBox::new((2, 2, 2), (3, 3, 3)), SEG_BG_VALUE);
        assert_ne!(v, backup);

        v.draw(&backup);
        v.set_edited_regions(backup.edited_regions().to_vec());
        assert_eq!(v, backup);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_count_matches_serial() {
        let mut v = solid(VoxelBox::new((0, 0, 0), (7, 7, 7)));
        v.draw_value(VoxelBox::new((0, 0, 0), (7, 0, 7)), SEG_BG_VALUE);
        assert_eq!(v.par_count_foreground(), v.count_foreground());
    }
}
