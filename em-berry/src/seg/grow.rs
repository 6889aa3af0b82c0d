//! 连通阈值生长核心.

use std::collections::VecDeque;

use itertools::iproduct;
use ndarray::{Array3, ArrayView3};

use crate::consts::mask::*;
use crate::error::GrowError;
use crate::Idx3d;

/// 对子卷 `sub` 从 `seed` 出发做连通阈值生长, 返回等形状的二值掩膜.
///
/// 生长规则: 种子体素无条件加入; 其余体素加入当且仅当其灰度值落在闭区间
/// `[lower, upper]` 内, 且与某个已加入体素 26-邻接 (含对角).
/// 掩膜中前景为 [`SEG_VOXEL_VALUE`], 背景为 [`SEG_BG_VALUE`].
///
/// 该函数是其输入的纯函数, 除构造掩膜外没有任何副作用.
///
/// # 返回值
///
/// 种子越出子卷范围时返回 [`GrowError::SeedOutsideExtent`];
/// 否则返回掩膜 (至少含种子一个前景体素).
pub fn connected_threshold(
    sub: &ArrayView3<'_, u8>,
    seed: Idx3d,
    lower: u8,
    upper: u8,
) -> Result<Array3<u8>, GrowError> {
    debug_assert!(lower <= upper);

    let dim = sub.dim();
    if seed.0 >= dim.0 || seed.1 >= dim.1 || seed.2 >= dim.2 {
        return Err(GrowError::SeedOutsideExtent);
    }

    let mut mask = Array3::from_elem(dim, SEG_BG_VALUE);
    let mut bfs_q = VecDeque::with_capacity(64);

    mask[seed] = SEG_VOXEL_VALUE;
    bfs_q.push_back(seed);

    while let Some(cur) = bfs_q.pop_front() {
        for neigh in neighbours26(cur, dim) {
            if is_background(mask[neigh]) && (lower..=upper).contains(&sub[neigh]) {
                mask[neigh] = SEG_VOXEL_VALUE;
                bfs_q.push_back(neigh);
            }
        }
    }
    Ok(mask)
}

/// 获取 `pos` 的 26-邻域体素索引. 保证返回的索引都不越界.
pub(crate) fn neighbours26((z, h, w): Idx3d, (zl, hl, wl): Idx3d) -> Vec<Idx3d> {
    let mut ans = Vec::with_capacity(26);
    for (dz, dh, dw) in iproduct!(-1i64..=1, -1i64..=1, -1i64..=1) {
        if (dz, dh, dw) == (0, 0, 0) {
            continue;
        }
        let (nz, nh, nw) = (z as i64 + dz, h as i64 + dh, w as i64 + dw);
        if (0..zl as i64).contains(&nz)
            && (0..hl as i64).contains(&nh)
            && (0..wl as i64).contains(&nw)
        {
            ans.push((nz as usize, nh as usize, nw as usize));
        }
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn count_fg(mask: &Array3<u8>) -> usize {
        mask.iter().filter(|p| is_foreground(**p)).count()
    }

    #[test]
    fn test_uniform_volume_fills_entirely() {
        // 均匀 20^3 体, 阈值 5: 处处可达
        let sub = Array3::from_elem((20, 20, 20), 100u8);
        let mask = connected_threshold(&sub.view(), (10, 10, 10), 95, 105).unwrap();
        assert_eq!(count_fg(&mask), 8000);
    }

    #[test]
    fn test_bright_block_excluded() {
        // 值 200 的 5^3 亮块在种子值 100±5 的范围之外
        let mut sub = Array3::from_elem((20, 20, 20), 100u8);
        for z in 3..8 {
            for h in 3..8 {
                for w in 3..8 {
                    sub[(z, h, w)] = 200;
                }
            }
        }
        let mask = connected_threshold(&sub.view(), (10, 10, 10), 95, 105).unwrap();
        assert_eq!(count_fg(&mask), 8000 - 125);
        assert!(is_background(mask[(5, 5, 5)]));
        assert!(is_foreground(mask[(10, 10, 10)]));
    }

    #[test]
    fn test_seed_always_included() {
        // 种子自身值在范围外也必须加入
        let sub = Array3::from_elem((3, 3, 3), 0u8);
        let mask = connected_threshold(&sub.view(), (1, 1, 1), 100, 110).unwrap();
        assert_eq!(count_fg(&mask), 1);
        assert!(is_foreground(mask[(1, 1, 1)]));
    }

    #[test]
    fn test_diagonal_connectivity() {
        // 仅有对角路径: 26-邻接必须能走通
        let mut sub = Array3::from_elem((3, 3, 3), 0u8);
        sub[(0, 0, 0)] = 100;
        sub[(1, 1, 1)] = 100;
        sub[(2, 2, 2)] = 100;
        let mask = connected_threshold(&sub.view(), (0, 0, 0), 95, 105).unwrap();
        assert_eq!(count_fg(&mask), 3);
        assert!(is_foreground(mask[(2, 2, 2)]));
    }

    #[test]
    fn test_threshold_monotonicity() {
        // 阈值放宽时掩膜只增不减 (包含关系)
        let mut sub = Array3::from_elem((8, 8, 8), 100u8);
        for (i, v) in sub.iter_mut().enumerate() {
            *v = (i % 64) as u8 + 80;
        }
        let seed = (4, 4, 4);
        let seed_val = sub[seed] as i32;
        let mut prev: Option<Array3<u8>> = None;
        for t in [0i32, 5, 15, 40, 90] {
            let lower = (seed_val - t).max(0) as u8;
            let upper = (seed_val + t).min(255) as u8;
            let mask = connected_threshold(&sub.view(), seed, lower, upper).unwrap();
            if let Some(p) = &prev {
                for (a, b) in p.iter().zip(mask.iter()) {
                    // p ⊆ mask
                    assert!(is_background(*a) || is_foreground(*b));
                }
            }
            prev = Some(mask);
        }
    }

    #[test]
    fn test_seed_outside_extent() {
        let sub = Array3::from_elem((4, 4, 4), 0u8);
        let err = connected_threshold(&sub.view(), (4, 0, 0), 0, 255).unwrap_err();
        assert_eq!(err, GrowError::SeedOutsideExtent);
    }
}
