//! 二值掩膜的形态学闭运算 (先膨胀后腐蚀).

use itertools::iproduct;
use ndarray::Array3;

use crate::consts::mask::*;

/// 对二值掩膜 `mask` 做半径为 `radius` 的形态学闭运算.
///
/// 结构元为体素空间中的球: 所有满足 `dz² + dh² + dw² ≤ r²` 的整数偏移.
/// 半径以 **体素** 为单位, 三个轴使用同一个整数半径; 当体素分辨率
/// 各向异性时, 实际物理闭运算因此是各向异性的 (沿用原始行为).
///
/// `radius == 0` 时恒等, 原样返回输入且不做任何分配.
/// 膨胀在四周各加宽 `radius` 的缓冲上进行, 缓冲域之外视为背景,
/// 腐蚀后裁剪回原形状.
pub fn close(mask: Array3<u8>, radius: u32) -> Array3<u8> {
    if radius == 0 {
        return mask;
    }
    let r = radius as usize;
    let ball = ball_offsets(radius);
    let (z, h, w) = mask.dim();

    // 膨胀: 前景体素的球邻域并集.
    let mut dilated = Array3::from_elem((z + 2 * r, h + 2 * r, w + 2 * r), SEG_BG_VALUE);
    for (pos, v) in mask.indexed_iter() {
        if !is_foreground(*v) {
            continue;
        }
        for (dz, dh, dw) in ball.iter() {
            let nz = (pos.0 + r) as i64 + dz;
            let nh = (pos.1 + r) as i64 + dh;
            let nw = (pos.2 + r) as i64 + dw;
            dilated[(nz as usize, nh as usize, nw as usize)] = SEG_VOXEL_VALUE;
        }
    }

    // 腐蚀: 仅在原始域上求值, 等价于整体腐蚀后裁剪.
    let mut ans = Array3::from_elem((z, h, w), SEG_BG_VALUE);
    for (pos, v) in ans.indexed_iter_mut() {
        let all_fg = ball.iter().all(|(dz, dh, dw)| {
            let nz = (pos.0 + r) as i64 + dz;
            let nh = (pos.1 + r) as i64 + dh;
            let nw = (pos.2 + r) as i64 + dw;
            is_foreground(dilated[(nz as usize, nh as usize, nw as usize)])
        });
        if all_fg {
            *v = SEG_VOXEL_VALUE;
        }
    }
    ans
}

/// 半径为 `radius` 的球形结构元偏移集合 (含原点).
fn ball_offsets(radius: u32) -> Vec<(i64, i64, i64)> {
    let r = radius as i64;
    iproduct!(-r..=r, -r..=r, -r..=r)
        .filter(|(dz, dh, dw)| dz * dz + dh * dh + dw * dw <= r * r)
        .collect()
}
