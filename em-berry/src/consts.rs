//! 通用常量.

/// 分割掩膜颜色.
pub mod mask {
    /// 分割掩膜中, 前景 (已分割) 体素的值.
    pub const SEG_VOXEL_VALUE: u8 = 0b_1111_1111;

    /// 分割掩膜中, 背景体素的值.
    pub const SEG_BG_VALUE: u8 = 0b_0000_0000;

    /// 体素是否是分割前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        matches!(p, SEG_VOXEL_VALUE)
    }

    /// 体素是否是分割背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, SEG_BG_VALUE)
    }
}

/// 原始灰度通道的最小强度.
pub const RAW_INTENSITY_MIN: i32 = 0;

/// 原始灰度通道的最大强度.
pub const RAW_INTENSITY_MAX: i32 = 255;

/// 对称阈值的合法闭区间, 同时也是阈值化后灰度范围的钳制区间.
pub const THRESHOLD_RANGE: (i32, i32) = (RAW_INTENSITY_MIN, RAW_INTENSITY_MAX);
