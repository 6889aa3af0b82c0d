//! 种子生长分割的用户配置与种子拾取辅助.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::{Channel, GridAttr, VoxelBox};
use crate::roi::OrthogonalRoi;
use crate::Idx3d;

/// 种子生长分割的持久化配置.
///
/// 配置只在过滤器构造和默认 ROI 生成时被读取, 运行中修改
/// 不影响已存在的过滤器.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgsConfig {
    /// 种子拾取的目标灰度值: 点选附近与该值最接近的体素被选为种子.
    pub best_pixel_value: u8,

    /// 新建过滤器的默认对称阈值.
    pub default_threshold: u8,

    /// 新建过滤器是否默认启用闭运算.
    pub apply_closing: bool,

    /// 启用闭运算时的默认半径 (体素).
    pub default_closing_radius: u32,

    /// 默认 ROI 在三个维度上的半边长 (体素), 顺序为 `[z, h, w]`.
    pub voi_half_extent: [usize; 3],

    /// 种子拾取的搜索半径 (体素): 在点选位置四周该半径的盒内寻找最佳体素.
    pub seed_snap_radius: usize,
}

impl Default for SgsConfig {
    fn default() -> Self {
        Self {
            best_pixel_value: 0,
            default_threshold: 30,
            apply_closing: false,
            default_closing_radius: 1,
            voi_half_extent: [40, 250, 250],
            seed_snap_radius: 5,
        }
    }
}

/// 以种子为中心生成默认正交 ROI, 钳制到通道范围内.
pub fn default_roi(seed: Idx3d, config: &SgsConfig, channel_extent: &VoxelBox) -> OrthogonalRoi {
    OrthogonalRoi::new(VoxelBox::around(
        seed,
        config.voi_half_extent,
        channel_extent,
    ))
}

/// 在点选位置附近拾取最佳种子体素.
///
/// 在以 `click` 为中心, 半径 [`SgsConfig::seed_snap_radius`] 的盒
/// (钳制到通道范围) 内, 选择灰度值与 [`SgsConfig::best_pixel_value`]
/// 最接近的体素; 并列时取行优先序最靠前者, 保证结果确定.
///
/// 如果 `click` 不在通道范围内, 则程序 panic.
pub fn best_seed(channel: &Channel, click: Idx3d, config: &SgsConfig) -> Idx3d {
    assert!(channel.check(&click), "点选位置 {click:?} 不在通道范围内");
    let r = config.seed_snap_radius;
    let search = VoxelBox::around(click, [r; 3], &channel.extent());

    let (lo, hi) = (search.min(), search.max());
    let mut best = lo;
    let mut best_diff = (channel[lo] as i32 - config.best_pixel_value as i32).abs();
    for z in lo.0..=hi.0 {
        for h in lo.1..=hi.1 {
            for w in lo.2..=hi.2 {
                let diff = (channel[(z, h, w)] as i32 - config.best_pixel_value as i32).abs();
                if diff < best_diff {
                    best = (z, h, w);
                    best_diff = diff;
                }
            }
        }
    }
    best
}
