//! 分割精化: 参数提交策略与工作 ROI 管理.
//!
//! [`RefineController`] 是交互层与过滤器之间的守门人: 它在把参数修改
//! 压入撤销栈之前完成全部校验 (参数范围, 编辑丢失确认, 种子在 ROI 内),
//! 任何一道校验失败都不会留下半施加的状态.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ParamError, RefineError};
use crate::history::{DiscardRoiModifications, SgsModification, UndoStack};
use crate::roi::RoiPtr;
use crate::seg::SeedGrowFilter;

/// 可共享的分割对象: 过滤器句柄加渲染表示代数.
///
/// 输出卷内容变化 (重算, 快照回填) 时代数递增, 渲染层据此丢弃
/// 过期的表示缓存.
#[derive(Clone)]
pub struct Segmentation {
    filter: Arc<Mutex<SeedGrowFilter>>,
    repr_generation: Arc<AtomicU64>,
}

impl Segmentation {
    /// 接管过滤器.
    pub fn new(filter: SeedGrowFilter) -> Self {
        Self {
            filter: Arc::new(Mutex::new(filter)),
            repr_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 锁定并访问过滤器.
    pub fn filter(&self) -> MutexGuard<'_, SeedGrowFilter> {
        // 锁毒化仅在持锁线程 panic 后出现, 此处直接传播 panic.
        self.filter.lock().unwrap()
    }

    /// 宣告所有已缓存的渲染表示失效.
    #[inline]
    pub fn invalidate_representations(&self) {
        self.repr_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// 当前表示代数. 代数变化意味着输出卷内容可能已不同.
    #[inline]
    pub fn representation_generation(&self) -> u64 {
        self.repr_generation.load(Ordering::SeqCst)
    }
}

/// 一次成功提交的回执.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// 新结果是否触及 ROI 边界 (提示用户分割可能不完整)?
    pub touching_roi: bool,
}

/// 参数提交控制器.
///
/// 持有分割对象、撤销栈、工作 ROI 槽以及编辑丢失确认回调.
/// 确认回调仅在输出卷带有手工编辑时被调用, 返回 `false` 即放弃提交.
pub struct RefineController {
    seg: Segmentation,
    undo: UndoStack,
    working_roi: Arc<Mutex<Option<RoiPtr>>>,
    confirm_discard: Box<dyn FnMut() -> bool + Send>,
}

impl RefineController {
    /// 以默认确认策略 (总是同意) 构造控制器.
    /// 工作 ROI 槽初始化为过滤器当前 ROI 的深拷贝.
    pub fn new(seg: Segmentation) -> Self {
        Self::with_confirm(seg, || true)
    }

    /// 指定编辑丢失确认回调 (交互层在此弹出确认对话框).
    pub fn with_confirm(seg: Segmentation, confirm: impl FnMut() -> bool + Send + 'static) -> Self {
        let working = seg.filter().roi().map(|r| r.clone_roi());
        Self {
            seg,
            undo: UndoStack::new(),
            working_roi: Arc::new(Mutex::new(working)),
            confirm_discard: Box::new(confirm),
        }
    }

    /// 分割对象句柄.
    #[inline]
    pub fn segmentation(&self) -> &Segmentation {
        &self.seg
    }

    /// 撤销栈.
    #[inline]
    pub fn history(&self) -> &UndoStack {
        &self.undo
    }

    /// 读取工作 ROI 槽.
    pub fn working_roi(&self) -> Option<RoiPtr> {
        self.lock_working().clone()
    }

    /// 覆写工作 ROI 槽 (交互层的 ROI 编辑落点). 不触发任何计算.
    pub fn set_working_roi(&self, roi: Option<RoiPtr>) {
        *self.lock_working() = roi;
    }

    fn lock_working(&self) -> MutexGuard<'_, Option<RoiPtr>> {
        // 锁毒化仅在持锁线程 panic 后出现, 此处直接传播 panic.
        self.working_roi.lock().unwrap()
    }

    /// 校验并提交一组新参数 (ROI, 对称阈值, 闭运算半径).
    ///
    /// 校验次序:
    ///
    /// 1. 参数范围 (阈值 `[0, 255]`, 半径非负);
    /// 2. 输出卷被手工编辑过时征求确认, 被拒即放弃;
    /// 3. 种子必须位于候选 ROI 内, 否则生长无处开始.
    ///
    /// 任一校验失败时不入栈, 过滤器与撤销栈保持原样.
    /// 参数与当前值完全一致时同样不入栈, 直接返回当前回执.
    pub fn modify(
        &mut self,
        roi: Option<RoiPtr>,
        threshold: i32,
        radius: i32,
    ) -> Result<Applied, RefineError> {
        if !(crate::consts::THRESHOLD_RANGE.0..=crate::consts::THRESHOLD_RANGE.1)
            .contains(&threshold)
        {
            return Err(ParamError::ThresholdOutOfRange(threshold).into());
        }
        if radius < 0 {
            return Err(ParamError::NegativeRadius(radius).into());
        }
        let threshold = threshold as u8;
        let radius = radius as u32;

        // 过滤器状态在锁内一次性取齐, 入栈前必须放锁 (redo 会再取锁).
        let (seed, edited, unchanged, touching) = {
            let f = self.seg.filter();
            // 读锁必须先于 `f` 落锁.
            let edited = f.output().read().is_edited();
            let same_roi = match (f.roi(), &roi) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            (
                f.seed(),
                edited,
                same_roi && f.lower_threshold() == threshold && f.closing_radius() == radius,
                f.is_touching_roi(),
            )
        };

        if unchanged {
            return Ok(Applied {
                touching_roi: touching,
            });
        }

        if edited && !(self.confirm_discard)() {
            return Err(RefineError::EditsNotConfirmed);
        }

        if let Some(roi) = &roi {
            if !roi.contains(seed) {
                return Err(RefineError::SeedOutsideRoi);
            }
        }

        self.undo
            .push(SgsModification::new(self.seg.clone(), roi, threshold, radius));

        Ok(Applied {
            touching_roi: self.seg.filter().is_touching_roi(),
        })
    }

    /// 把工作 ROI 槽回滚到过滤器上次提交的 ROI (可撤销).
    pub fn discard_roi_modifications(&mut self) {
        let committed = self.seg.filter().roi().map(|r| r.clone_roi());
        self.undo.push(DiscardRoiModifications::new(
            Arc::clone(&self.working_roi),
            committed.as_ref(),
        ));
    }

    /// 撤销最近一次提交.
    pub fn undo(&mut self) {
        self.undo.undo();
    }

    /// 重做最近一次撤销.
    pub fn redo(&mut self) {
        self.undo.redo();
    }
}
