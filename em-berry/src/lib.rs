#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 3D 显微体数据 (8-bit 灰度栈) 的种子区域生长分割引擎.
//!
//! 引擎围绕 [`SeedGrowFilter`] 组织: 给定一个种子体素、一个对称灰度阈值、
//! 一个可选的 ROI 和一个闭运算半径, 过滤器在 ROI 限定的提取窗口上运行
//! 连通阈值生长, 随后进行形态学闭运算, 并把结果掩膜发布到输出卷.
//! 参数修改通过 [`history::SgsModification`] 进入撤销栈,
//! 手工涂改过的体素在 undo 时按字节精确恢复, 不会被重算覆盖.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体素缓冲均以 `(z, h, w)` 顺序组织, z 为切片方向.
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 功能块
//!
//! ### 连通阈值生长 ✅
//!
//! 26-邻接 BFS 泛洪. 实现位于 `em-berry/src/seg/grow.rs`.
//!
//! ### 形态学闭运算 ✅
//!
//! 球形结构元, 体素整数半径. 实现位于 `em-berry/src/seg/closing.rs`.
//!
//! ### ROI 限定与种子有效性检查 ✅
//!
//! 正交盒与球形 ROI, 以及范围外哨兵遮蔽. 实现位于 `em-berry/src/roi.rs`.
//!
//! ### 带编辑区快照的撤销/重做 ✅
//!
//! 懒快照策略: 仅当输出被手工编辑过时才在首次 redo 深拷贝原卷.
//! 实现位于 `em-berry/src/history.rs`.
//!
//! ### 精化策略 (提交前校验) ✅
//!
//! 编辑丢失确认与 "种子在 ROI 内" 门控. 实现位于 `em-berry/src/refine.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量. 顺序为 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

/// 单体素分辨率, 以微米为单位, 顺序为 `[z, h, w]`.
pub type Spacing = [f64; 3];

pub mod consts;

mod error;

pub use error::{GrowError, ParamError, RefineError};

/// 3D 体数据基础结构.
mod data;

pub use data::{Channel, GridAttr, Output, SegVolume, VoxelBox};

pub mod roi;

pub use roi::{OrthogonalRoi, Roi, RoiPtr, SphereRoi};

mod seg;

pub use seg::{closing, grow, FilterEvent, SeedGrowFilter};

pub mod history;

pub mod refine;

pub mod settings;

pub use settings::SgsConfig;

pub mod prelude;

/// 获取体素 `pos` 的中心点世界坐标 (微米), 顺序为 `[z, h, w]`.
#[inline]
pub fn voxel_center_um((z, h, w): Idx3d, spacing: Spacing) -> [f64; 3] {
    [
        (z as f64 + 0.5) * spacing[0],
        (h as f64 + 0.5) * spacing[1],
        (w as f64 + 0.5) * spacing[2],
    ]
}
