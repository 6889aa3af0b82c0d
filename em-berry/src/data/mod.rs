//! 3D 显微体数据基础结构.

use std::ops::Index;
use std::sync::Arc;

use ndarray::{s, Array3, ArrayView3, Axis};

use crate::{Idx3d, Spacing};

mod extent;

mod volume;

pub use extent::VoxelBox;
pub use volume::{Output, SegVolume};

/// 3D 体数据网格的共用属性.
pub trait GridAttr {
    /// 获取数据形状大小, 格式为 `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 获取单个体素分辨率. 该分辨率以微米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    fn spacing(&self) -> Spacing;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以微米为单位.
    #[inline]
    fn z_um(&self) -> f64 {
        self.spacing()[0]
    }

    /// 获取 height 方向 (自然 2D 图像的垂直方向) 体素分辨率, 以微米为单位.
    #[inline]
    fn height_um(&self) -> f64 {
        self.spacing()[1]
    }

    /// 获取 width 方向 (自然 2D 图像的水平方向) 体素分辨率, 以微米为单位.
    #[inline]
    fn width_um(&self) -> f64 {
        self.spacing()[2]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.spacing();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方微米为单位.
    #[inline]
    fn voxel_um3(&self) -> f64 {
        self.spacing().iter().product()
    }
}

/// 8-bit 灰度 3D 显微通道 (源体数据).
///
/// 通道在过滤器生命周期内不可变, 多个过滤器实例可以共享同一通道
/// (通过 [`Arc<Channel>`]).
#[derive(Debug, Clone)]
pub struct Channel {
    data: Array3<u8>,
    spacing: Spacing,
}

impl GridAttr for Channel {
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

impl Index<Idx3d> for Channel {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Channel {
    /// 直接由裸数据初始化. `spacing` 各分量必须为正,
    /// `data` 各维必须非零, 否则程序 panic.
    pub fn new(data: Array3<u8>, spacing: Spacing) -> Self {
        assert!(spacing.iter().all(|s| *s > 0.0), "体素分辨率必须为正");
        assert!(!data.is_empty(), "通道数据不能为空");
        Self { data, spacing }
    }

    /// 构造灰度值处处为 `value` 的均匀通道. 主要用于实验与测试.
    pub fn uniform(shape: Idx3d, value: u8, spacing: Spacing) -> Self {
        Self::new(Array3::from_elem(shape, value), spacing)
    }

    /// 获取覆盖整个通道的体素盒.
    #[inline]
    pub fn extent(&self) -> VoxelBox {
        VoxelBox::from_shape(self.shape())
    }

    /// 获取给定位置的灰度值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&u8> {
        self.data.get(pos)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 提取 `bx` 范围内的子卷 (deepcopy).
    ///
    /// 如果 `bx` 不完全位于通道范围内, 则程序 panic.
    pub fn extract(&self, bx: &VoxelBox) -> Array3<u8> {
        assert!(self.extent().encloses(bx), "提取窗口 {bx:?} 越界");
        let (lo, hi) = (bx.min(), bx.max());
        self.data
            .slice(s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2])
            .to_owned()
    }

    /// 就地修改给定位置的灰度值. 主要用于构造合成数据. 越界时 panic.
    #[inline]
    pub fn fill_box(&mut self, bx: &VoxelBox, value: u8) {
        assert!(self.extent().encloses(bx), "填充范围 {bx:?} 越界");
        let (lo, hi) = (bx.min(), bx.max());
        self.data
            .slice_mut(s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2])
            .fill(value);
    }

    /// 共享句柄.
    #[inline]
    pub fn into_shared(self) -> Arc<Channel> {
        Arc::new(self)
    }

    /// 获取 z 空间的第 `z_index` 层切片视图. 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ndarray::ArrayView2<'_, u8> {
        self.data.index_axis(Axis(0), z_index)
    }
}
