//! 种子区域生长分割过滤器.

pub mod closing;
pub mod grow;

use std::sync::Arc;

use ndarray::{s, Array3};

use crate::consts::mask::*;
use crate::consts::THRESHOLD_RANGE;
use crate::data::{Channel, GridAttr, Output, SegVolume, VoxelBox};
use crate::error::{GrowError, ParamError};
use crate::roi::RoiPtr;
use crate::Idx3d;

/// 过滤器状态变化通知.
///
/// 参数修改事件在每次成功修改时立即发出, 与是否已经重算无关.
#[derive(Clone)]
pub enum FilterEvent {
    /// 对称阈值被修改. 本引擎保证 `lower == upper`.
    ThresholdModified {
        /// 新的下阈值.
        lower: u8,
        /// 新的上阈值.
        upper: u8,
    },

    /// 闭运算半径被修改.
    RadiusModified(u32),

    /// ROI 被替换 (`None` 表示整个通道).
    RoiModified(Option<RoiPtr>),

    /// 一次可能长时间阻塞的重算即将开始.
    UpdateStarted,

    /// 重算结束.
    UpdateFinished,
}

type ObserverFn = Box<dyn Fn(&FilterEvent) + Send>;

/// 种子区域生长分割过滤器.
///
/// 持有源通道句柄、可变参数 (对称阈值, 闭运算半径, 可选 ROI)、
/// 单输出槽以及 `touches_roi` 标志. 种子在构造后不可变.
///
/// 参数修改只标脏不重算; [`Self::update`] 在脏时同步执行完整流水线:
/// 提取窗口 → 哨兵遮蔽 (非正交 ROI) → 连通阈值生长 → 闭运算 →
/// 最小包围盒裁剪 → 发布 → `touches_roi` 重算.
pub struct SeedGrowFilter {
    channel: Arc<Channel>,

    seed: Idx3d,

    lower_th: u8,
    upper_th: u8,
    radius: u32,
    roi: Option<RoiPtr>,

    // 上次成功重算时的参数副本, 用于脏检查.
    prev_lower_th: u8,
    prev_upper_th: u8,
    prev_radius: u32,
    prev_roi: Option<RoiPtr>,

    has_output: bool,
    force_update: bool,
    output: Output,
    touches_roi: bool,

    observers: Vec<ObserverFn>,
}

/// 以 `Arc` 身份比较两个可选 ROI 是否是同一个对象.
fn roi_ptr_eq(a: &Option<RoiPtr>, b: &Option<RoiPtr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// 将 `i32` 阈值校验到 `[0, 255]`.
fn validate_threshold(th: i32) -> Result<u8, ParamError> {
    let (lo, hi) = THRESHOLD_RANGE;
    if !(lo..=hi).contains(&th) {
        return Err(ParamError::ThresholdOutOfRange(th));
    }
    Ok(th as u8)
}

/// 构造与访问器.
impl SeedGrowFilter {
    /// 以配置的默认参数构造过滤器.
    ///
    /// `seed` 是用户点选的体素索引, 必须位于通道范围内, 否则程序 panic.
    pub fn new(channel: Arc<Channel>, seed: Idx3d, config: &crate::SgsConfig) -> Self {
        assert!(channel.check(&seed), "种子 {seed:?} 不在通道范围内");
        let spacing = channel.spacing();
        let th = config.default_threshold;
        let radius = if config.apply_closing {
            config.default_closing_radius
        } else {
            0
        };
        Self {
            channel,
            seed,
            lower_th: th,
            upper_th: th,
            radius,
            roi: None,
            prev_lower_th: th,
            prev_upper_th: th,
            prev_radius: radius,
            prev_roi: None,
            has_output: false,
            force_update: false,
            output: Output::new(SegVolume::empty(spacing)),
            touches_roi: false,
            observers: Vec::new(),
        }
    }

    /// 种子体素索引.
    #[inline]
    pub fn seed(&self) -> Idx3d {
        self.seed
    }

    /// 下阈值. 对称契约下恒等于上阈值.
    #[inline]
    pub fn lower_threshold(&self) -> u8 {
        self.lower_th
    }

    /// 上阈值. 对称契约下恒等于下阈值.
    #[inline]
    pub fn upper_threshold(&self) -> u8 {
        self.upper_th
    }

    /// 闭运算半径 (体素). 0 表示禁用.
    #[inline]
    pub fn closing_radius(&self) -> u32 {
        self.radius
    }

    /// 当前 ROI. `None` 表示整个通道.
    #[inline]
    pub fn roi(&self) -> Option<&RoiPtr> {
        self.roi.as_ref()
    }

    /// 源通道句柄.
    #[inline]
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// 源通道的体素分辨率.
    #[inline]
    pub fn spacing(&self) -> crate::Spacing {
        self.channel.spacing()
    }

    /// 输出槽.
    #[inline]
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// 上次成功重算的结果是否触及 ROI 边界 (分割可能因 ROI 不完整)?
    #[inline]
    pub fn is_touching_roi(&self) -> bool {
        self.touches_roi
    }

    /// 注册状态变化回调.
    pub fn observe(&mut self, f: impl Fn(&FilterEvent) + Send + 'static) {
        self.observers.push(Box::new(f));
    }

    fn emit(&self, event: &FilterEvent) {
        for ob in self.observers.iter() {
            ob(event);
        }
    }
}

/// 参数修改.
impl SeedGrowFilter {
    /// 设置下阈值. 对称契约: 上下阈值同时被设为 `th`.
    ///
    /// `th` 超出 `[0, 255]` 时拒绝并返回错误, 过滤器状态不变.
    pub fn set_lower_threshold(&mut self, th: i32) -> Result<(), ParamError> {
        let th = validate_threshold(th)?;
        self.set_symmetric_threshold(th);
        Ok(())
    }

    /// 设置上阈值. 对称契约: 上下阈值同时被设为 `th`.
    ///
    /// `th` 超出 `[0, 255]` 时拒绝并返回错误, 过滤器状态不变.
    pub fn set_upper_threshold(&mut self, th: i32) -> Result<(), ParamError> {
        let th = validate_threshold(th)?;
        self.set_symmetric_threshold(th);
        Ok(())
    }

    /// 设置闭运算半径. 负值被拒绝, 过滤器状态不变.
    pub fn set_closing_radius(&mut self, radius: i32) -> Result<(), ParamError> {
        if radius < 0 {
            return Err(ParamError::NegativeRadius(radius));
        }
        self.set_radius(radius as u32);
        Ok(())
    }

    /// 替换 ROI. `None` 表示不限定 (整个通道).
    pub fn set_roi(&mut self, roi: Option<RoiPtr>) {
        if roi_ptr_eq(&self.roi, &roi) {
            return;
        }
        self.roi = roi;
        self.touches_roi = false;
        self.emit(&FilterEvent::RoiModified(self.roi.clone()));
    }

    pub(crate) fn set_symmetric_threshold(&mut self, th: u8) {
        if th != self.lower_th || th != self.upper_th {
            self.lower_th = th;
            self.upper_th = th;
            self.emit(&FilterEvent::ThresholdModified {
                lower: th,
                upper: th,
            });
        }
    }

    pub(crate) fn set_radius(&mut self, radius: u32) {
        if radius != self.radius {
            self.radius = radius;
            self.emit(&FilterEvent::RadiusModified(radius));
        }
    }
}

/// 重算流水线.
impl SeedGrowFilter {
    /// 宣告输出过期, 即使参数与上次重算时完全一致.
    ///
    /// 输出卷被外部整体回填 (如撤销命令的快照恢复) 后, 参数基线
    /// 已不再描述卷的实际内容, 调用方必须据此强制下一次重算.
    pub fn set_force_update(&mut self, force: bool) {
        self.force_update = force;
    }

    /// 输出是否过期 (参数修改后尚未重算, 或从未计算过, 或被强制标脏)?
    pub fn needs_update(&self) -> bool {
        !self.has_output
            || self.force_update
            || self.lower_th != self.prev_lower_th
            || self.upper_th != self.prev_upper_th
            || self.radius != self.prev_radius
            || !roi_ptr_eq(&self.roi, &self.prev_roi)
    }

    /// 同步重算. 输出未过期时为 no-op.
    ///
    /// 这是一个可能长时间阻塞的调用; 开始与结束分别以
    /// [`FilterEvent::UpdateStarted`] / [`FilterEvent::UpdateFinished`] 通知.
    /// 退化情况 (种子在提取窗口之外) 不报错, 而是发布零体素空卷.
    pub fn update(&mut self) {
        if !self.needs_update() {
            return;
        }
        self.emit(&FilterEvent::UpdateStarted);
        self.execute();
        self.emit(&FilterEvent::UpdateFinished);
    }

    /// 完整流水线. 调用前提: 输出已过期.
    fn execute(&mut self) {
        debug_assert_eq!(self.lower_th, self.upper_th, "对称阈值被破坏");

        let channel_extent = self.channel.extent();
        let extraction = match &self.roi {
            Some(roi) => roi.extent().intersection(&channel_extent),
            None => Some(channel_extent),
        };

        // 种子不在提取窗口内: 生长无处开始, 发布空卷.
        let Some(extraction) = extraction.filter(|bx| bx.contains(self.seed)) else {
            self.publish(SegVolume::empty(self.spacing()));
            self.touches_roi = false;
            return;
        };

        let seed_value = self.channel[self.seed];
        let lower = seed_value.saturating_sub(self.lower_th);
        let upper = seed_value.saturating_add(self.upper_th);

        let mut sub = self.channel.extract(&extraction);

        if let Some(roi) = &self.roi {
            // 非正交 ROI: 用范围外哨兵值遮蔽 ROI 之外的体素.
            // 阈值化范围已覆盖 [0, 255] 时不存在哨兵, 遮蔽退化为包围盒.
            if let Some(out_value) = sentinel_value(seed_value, self.lower_th, self.upper_th) {
                roi.apply_outside(&mut sub, &extraction, out_value);
            }
        }

        let seed_local = extraction.local(self.seed);
        let mask = match grow::connected_threshold(&sub.view(), seed_local, lower, upper) {
            Ok(mask) => mask,
            Err(GrowError::SeedOutsideExtent) => {
                self.publish(SegVolume::empty(self.spacing()));
                self.touches_roi = false;
                return;
            }
        };

        let mask = closing::close(mask, self.radius);

        let volume = minimal_volume(mask, &extraction, self.spacing());
        self.publish(volume);

        self.touches_roi = self.roi.is_some() && self.compute_touches_roi();
    }

    /// 发布新输出并同步脏检查基线.
    fn publish(&mut self, volume: SegVolume) {
        self.output.replace(volume);
        self.has_output = true;
        self.force_update = false;
        self.prev_lower_th = self.lower_th;
        self.prev_upper_th = self.upper_th;
        self.prev_radius = self.radius;
        self.prev_roi = self.roi.clone();
    }

    /// 判断分割结果是否触及 ROI 边界.
    ///
    /// 规则: 只统计严格位于通道内部的 ROI 表面 —
    /// 与通道边缘重合的面意味着生长是被图像而不是 ROI 截断的.
    fn compute_touches_roi(&self) -> bool {
        let Some(roi) = self.roi.as_ref() else {
            return false;
        };
        let channel_extent = self.channel.extent();
        let volume = self.output.read();
        let Some(seg_extent) = volume.extent() else {
            return false;
        };

        if roi.is_orthogonal() {
            // 快速路径: 最小包围盒的每个面上必有前景体素,
            // 因此面坐标重合即判定触及.
            let Some(roi_extent) = roi.extent().intersection(&channel_extent) else {
                return false;
            };
            for axis in 0..3 {
                if seg_extent.axis_min(axis) == roi_extent.axis_min(axis)
                    && roi_extent.axis_min(axis) > channel_extent.axis_min(axis)
                {
                    return true;
                }
                if seg_extent.axis_max(axis) == roi_extent.axis_max(axis)
                    && roi_extent.axis_max(axis) < channel_extent.axis_max(axis)
                {
                    return true;
                }
            }
            false
        } else {
            // 一般路径: 某前景体素的 6-邻居仍在通道内却不属于 ROI,
            // 说明生长在 ROI 表面被截断.
            let (zl, hl, wl) = self.channel.shape();
            for (local, v) in volume.data().indexed_iter() {
                if !is_foreground(*v) {
                    continue;
                }
                let (z, h, w) = seg_extent.global(local);
                let neighbours = [
                    (z.wrapping_sub(1), h, w),
                    (z.saturating_add(1), h, w),
                    (z, h.wrapping_sub(1), w),
                    (z, h.saturating_add(1), w),
                    (z, h, w.wrapping_sub(1)),
                    (z, h, w.saturating_add(1)),
                ];
                for n in neighbours {
                    if n.0 < zl && n.1 < hl && n.2 < wl && !roi.contains(n) {
                        return true;
                    }
                }
            }
            false
        }
    }
}

/// 阈值化范围之外的哨兵灰度值.
///
/// 优先取上界之上一档, 不可表示时取下界之下一档;
/// 范围覆盖整个 [0, 255] 时返回 `None`.
fn sentinel_value(seed_value: u8, lower_th: u8, upper_th: u8) -> Option<u8> {
    let above = seed_value as i32 + upper_th as i32 + 1;
    if above <= 255 {
        return Some(above as u8);
    }
    let below = seed_value as i32 - lower_th as i32 - 1;
    (below >= 0).then_some(below as u8)
}

/// 将掩膜裁剪到前景最小包围盒, 得到可发布的分割卷.
/// 掩膜全背景时返回空卷.
fn minimal_volume(mask: Array3<u8>, extraction: &VoxelBox, spacing: crate::Spacing) -> SegVolume {
    let mut lo = (usize::MAX, usize::MAX, usize::MAX);
    let mut hi = (0usize, 0usize, 0usize);
    let mut any = false;
    for (pos, v) in mask.indexed_iter() {
        if is_foreground(*v) {
            any = true;
            lo = (lo.0.min(pos.0), lo.1.min(pos.1), lo.2.min(pos.2));
            hi = (hi.0.max(pos.0), hi.1.max(pos.1), hi.2.max(pos.2));
        }
    }
    if !any {
        return SegVolume::empty(spacing);
    }
    let cropped = mask
        .slice(s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2])
        .to_owned();
    SegVolume::new(cropped, extraction.global(lo), spacing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::{OrthogonalRoi, SphereRoi};
    use crate::SgsConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn uniform_filter(shape: Idx3d, value: u8, seed: Idx3d) -> SeedGrowFilter {
        let channel = Channel::uniform(shape, value, [1.0; 3]).into_shared();
        SeedGrowFilter::new(channel, seed, &SgsConfig::default())
    }

    #[test]
    fn test_uniform_channel_fills_whole_extent() {
        // 场景 1: 20^3 均匀体, 无 ROI, 半径 0 → 全 8000 体素
        let mut f = uniform_filter((20, 20, 20), 100, (10, 10, 10));
        f.set_lower_threshold(5).unwrap();
        f.set_closing_radius(0).unwrap();
        f.update();

        let v = f.output().read();
        assert_eq!(v.count_foreground(), 8000);
        assert_eq!(v.extent(), Some(VoxelBox::from_shape((20, 20, 20))));
        assert!(!f.is_touching_roi());
    }

    #[test]
    fn test_bright_region_excluded() {
        // 场景 2: 亮块在阈值范围外
        let mut channel = Channel::uniform((20, 20, 20), 100, [1.0; 3]);
        channel.fill_box(&VoxelBox::new((3, 3, 3), (7, 7, 7)), 200);
        let mut f =
            SeedGrowFilter::new(channel.into_shared(), (10, 10, 10), &SgsConfig::default());
        f.set_lower_threshold(5).unwrap();
        f.update();

        let v = f.output().read();
        assert_eq!(v.count_foreground(), 8000 - 125);
        assert_eq!(v.get((5, 5, 5)), Some(SEG_BG_VALUE));
    }

    #[test]
    fn test_touching_roi_corner_scenario() {
        // 场景 3: 种子在角落, ROI [0,10]^3 ⊂ 20^3 → 触及
        let mut f = uniform_filter((20, 20, 20), 100, (0, 0, 0));
        f.set_lower_threshold(5).unwrap();
        f.set_roi(Some(
            OrthogonalRoi::new(VoxelBox::new((0, 0, 0), (10, 10, 10))).into_shared(),
        ));
        f.update();

        let v = f.output().read();
        assert_eq!(v.count_foreground(), 11 * 11 * 11);
        drop(v);
        assert!(f.is_touching_roi());
    }

    #[test]
    fn test_mask_never_escapes_roi() {
        // ROI 是通道真子集时, 掩膜不得越出 ROI 范围
        let roi_box = VoxelBox::new((5, 5, 5), (14, 14, 14));
        let mut f = uniform_filter((20, 20, 20), 100, (10, 10, 10));
        f.set_lower_threshold(10).unwrap();
        f.set_roi(Some(OrthogonalRoi::new(roi_box).into_shared()));
        f.update();

        let v = f.output().read();
        let seg = v.extent().unwrap();
        assert!(roi_box.encloses(&seg));
        assert_eq!(v.count_foreground(), roi_box.size());
    }

    #[test]
    fn test_sphere_roi_masks_growth() {
        // 非正交 ROI: 生长被限制在球内, 且触及球面
        let spacing = [1.0; 3];
        let mut f = uniform_filter((20, 20, 20), 100, (10, 10, 10));
        f.set_lower_threshold(5).unwrap();
        f.set_roi(Some(
            SphereRoi::new([10.5, 10.5, 10.5], 4.0, spacing).into_shared(),
        ));
        f.update();

        let v = f.output().read();
        assert!(v.count_foreground() > 0);
        for (local, val) in v.data().indexed_iter() {
            if is_foreground(*val) {
                let g = v.extent().unwrap().global(local);
                assert!(f.roi().unwrap().contains(g), "{g:?} 越出球 ROI");
            }
        }
        drop(v);
        assert!(f.is_touching_roi());
    }

    #[test]
    fn test_seed_outside_roi_gives_empty_output() {
        let mut f = uniform_filter((20, 20, 20), 100, (15, 15, 15));
        f.set_roi(Some(
            OrthogonalRoi::new(VoxelBox::new((0, 0, 0), (5, 5, 5))).into_shared(),
        ));
        f.update();

        assert!(f.output().read().is_empty());
        assert!(!f.is_touching_roi());
        // 空结果也是合法终态, 不应保持脏
        assert!(!f.needs_update());
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut f = uniform_filter((12, 12, 12), 80, (6, 6, 6));
        f.set_lower_threshold(3).unwrap();

        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        f.observe(move |e| {
            if matches!(e, FilterEvent::UpdateStarted) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        f.update();
        let first = f.output().read().clone();
        f.update(); // 参数未变: no-op
        let second = f.output().read().clone();

        assert_eq!(first, second);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closing_fills_gap_through_filter() {
        // 场景 4: 实心块中单体素暗洞, 闭运算半径 2 填补
        let mut channel = Channel::uniform((13, 13, 13), 100, [1.0; 3]);
        channel.fill_box(&VoxelBox::new((6, 6, 6), (6, 6, 6)), 250);
        let mut f = SeedGrowFilter::new(channel.into_shared(), (2, 2, 2), &SgsConfig::default());
        f.set_lower_threshold(5).unwrap();

        f.set_closing_radius(0).unwrap();
        f.update();
        assert_eq!(f.output().read().get((6, 6, 6)), Some(SEG_BG_VALUE));

        f.set_closing_radius(2).unwrap();
        f.update();
        assert_eq!(f.output().read().get((6, 6, 6)), Some(SEG_VOXEL_VALUE));
    }

    #[test]
    fn test_force_update_marks_clean_filter_dirty() {
        let mut f = uniform_filter((8, 8, 8), 50, (4, 4, 4));
        f.update();
        assert!(!f.needs_update());

        // 参数未变, 仅外部回填过输出
        f.set_force_update(true);
        assert!(f.needs_update());
        f.update();
        assert!(!f.needs_update());
        assert_eq!(f.output().read().count_foreground(), 512);
    }

    #[test]
    fn test_param_validation_rejects_without_mutation() {
        let mut f = uniform_filter((8, 8, 8), 50, (4, 4, 4));
        let th = f.lower_threshold();

        assert_eq!(
            f.set_lower_threshold(300).unwrap_err(),
            ParamError::ThresholdOutOfRange(300)
        );
        assert_eq!(
            f.set_closing_radius(-1).unwrap_err(),
            ParamError::NegativeRadius(-1)
        );
        assert_eq!(f.lower_threshold(), th);
        assert_eq!(f.upper_threshold(), th);
    }

    #[test]
    fn test_events_fire_on_mutation_before_update() {
        let mut f = uniform_filter((8, 8, 8), 50, (4, 4, 4));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        f.observe(move |e| match e {
            FilterEvent::ThresholdModified { lower, upper } => {
                assert_eq!(lower, upper);
                counter.fetch_add(1, Ordering::SeqCst);
            }
            FilterEvent::RadiusModified(2) | FilterEvent::RoiModified(Some(_)) => {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        });

        f.set_upper_threshold(42).unwrap();
        f.set_closing_radius(2).unwrap();
        f.set_roi(Some(
            OrthogonalRoi::new(VoxelBox::new((0, 0, 0), (3, 3, 3))).into_shared(),
        ));
        // 三次修改三次通知, 与 update 无关
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(f.needs_update());
    }

    #[test]
    fn test_sentinel_value_resolution() {
        assert_eq!(sentinel_value(100, 5, 5), Some(106));
        // 上方溢出时取下方
        assert_eq!(sentinel_value(253, 10, 10), Some(242));
        // 范围覆盖 [0, 255] 时无哨兵
        assert_eq!(sentinel_value(128, 255, 255), None);
    }
}
