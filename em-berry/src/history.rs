//! 撤销/重做基础设施与分割参数修改命令.
//!
//! 修改命令采用懒快照策略: 只有当输出卷带有手工编辑时, 首次 redo
//! 才会深拷贝整卷作为快照; undo 时按字节回填, 保证编辑不被重算覆盖.
//! 未被编辑过的输出则在 undo 时直接以旧参数重算, 不付出快照内存.

use std::sync::{Arc, Mutex};

use crate::data::SegVolume;
use crate::refine::Segmentation;
use crate::roi::RoiPtr;

/// 可撤销命令.
///
/// 与栈的约定: 命令入栈时立即执行一次 [`Self::redo`];
/// 此后 undo 与 redo 交替调用, 次数差不超过 1.
pub trait UndoCommand {
    /// 施加 (或重新施加) 该命令.
    fn redo(&mut self);

    /// 撤销该命令, 将受影响对象恢复到 redo 之前的状态.
    fn undo(&mut self);

    /// 面向用户的命令描述.
    fn text(&self) -> &str;
}

/// 线性撤销栈.
///
/// `index` 指向下一个待 redo 的命令; 在新命令入栈时,
/// `index` 之后的 redo 尾巴被整体丢弃.
#[derive(Default)]
pub struct UndoStack {
    commands: Vec<Box<dyn UndoCommand + Send>>,
    index: usize,
}

impl UndoStack {
    /// 构造空栈.
    pub fn new() -> Self {
        Self::default()
    }

    /// 丢弃 redo 尾巴, 执行并压入新命令.
    pub fn push(&mut self, mut cmd: impl UndoCommand + Send + 'static) {
        self.commands.truncate(self.index);
        cmd.redo();
        self.commands.push(Box::new(cmd));
        self.index = self.commands.len();
    }

    /// 撤销最近一个已施加的命令. 无可撤销命令时为 no-op.
    pub fn undo(&mut self) {
        if self.index > 0 {
            self.index -= 1;
            self.commands[self.index].undo();
        }
    }

    /// 重做最近一个被撤销的命令. 无可重做命令时为 no-op.
    pub fn redo(&mut self) {
        if self.index < self.commands.len() {
            self.commands[self.index].redo();
            self.index += 1;
        }
    }

    /// 栈中命令总数 (含已撤销的).
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// 栈是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 下一个待 redo 命令的下标, 同时也是已施加命令的个数.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 是否存在可撤销的命令?
    #[inline]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    /// 是否存在可重做的命令?
    #[inline]
    pub fn can_redo(&self) -> bool {
        self.index < self.commands.len()
    }
}

/// 种子生长分割的参数修改命令.
///
/// redo 施加新参数 (ROI, 对称阈值, 闭运算半径) 并同步重算;
/// undo 恢复旧参数, 随后:
///
/// 1. 若 redo 前输出带有手工编辑 (此时首次 redo 已经拍下整卷快照),
///    则按字节回填快照, **不**重算, 过滤器保持过期状态;
/// 2. 否则直接以旧参数重算.
pub struct SgsModification {
    seg: Segmentation,
    text: String,

    roi: Option<RoiPtr>,
    threshold: u8,
    radius: u32,

    prev_roi: Option<RoiPtr>,
    prev_threshold: u8,
    prev_radius: u32,

    // 首次 redo 时的编辑卷快照 (仅当输出被编辑过).
    snapshot: Option<SegVolume>,
}

impl SgsModification {
    /// 以过滤器的当前参数为恢复目标构造命令. 命令此时尚未施加.
    pub fn new(seg: Segmentation, roi: Option<RoiPtr>, threshold: u8, radius: u32) -> Self {
        let (prev_roi, prev_threshold, prev_radius) = {
            let f = seg.filter();
            (f.roi().cloned(), f.lower_threshold(), f.closing_radius())
        };
        Self {
            seg,
            text: "修改种子生长分割参数".to_owned(),
            roi,
            threshold,
            radius,
            prev_roi,
            prev_threshold,
            prev_radius,
            snapshot: None,
        }
    }
}

impl UndoCommand for SgsModification {
    fn redo(&mut self) {
        {
            let mut f = self.seg.filter();
            if self.snapshot.is_none() && f.output().read().is_edited() {
                self.snapshot = Some(f.output().read().clone());
            }
            f.set_roi(self.roi.clone());
            f.set_symmetric_threshold(self.threshold);
            f.set_radius(self.radius);
            f.update();
        }
        self.seg.invalidate_representations();
    }

    fn undo(&mut self) {
        {
            let mut f = self.seg.filter();
            f.set_roi(self.prev_roi.clone());
            f.set_symmetric_threshold(self.prev_threshold);
            f.set_radius(self.prev_radius);

            match &self.snapshot {
                Some(snap) => {
                    // 字节级回填: 编辑过的卷不允许用重算近似.
                    {
                        let mut out = f.output().write();
                        if let Some(bx) = snap.extent() {
                            out.resize(bx);
                        }
                        out.draw(snap);
                        out.set_edited_regions(snap.edited_regions().to_vec());
                    }
                    // 参数基线已与卷内容脱钩, 下一次 redo 必须重算.
                    f.set_force_update(true);
                }
                None => f.update(),
            }
        }
        self.seg.invalidate_representations();
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// 丢弃对工作 ROI 的未提交修改.
///
/// 构造时从过滤器深拷贝一份 "上次提交的 ROI" 作为替换值;
/// redo 与 undo 都是同一个交换操作, 互为逆.
pub struct DiscardRoiModifications {
    working_roi: Arc<Mutex<Option<RoiPtr>>>,
    stash: Option<RoiPtr>,
    text: String,
}

impl DiscardRoiModifications {
    /// `working_roi` 是待回滚的工作槽, `committed` 是过滤器当前持有的 ROI.
    pub fn new(working_roi: Arc<Mutex<Option<RoiPtr>>>, committed: Option<&RoiPtr>) -> Self {
        Self {
            working_roi,
            stash: committed.map(|r| r.clone_roi()),
            text: "丢弃 ROI 修改".to_owned(),
        }
    }

    fn swap(&mut self) {
        // 锁毒化仅在持锁线程 panic 后出现, 此处直接传播 panic.
        let mut slot = self.working_roi.lock().unwrap();
        std::mem::swap(&mut *slot, &mut self.stash);
    }
}

impl UndoCommand for DiscardRoiModifications {
    fn redo(&mut self) {
        self.swap();
    }

    fn undo(&mut self) {
        self.swap();
    }

    fn text(&self) -> &str {
        &self.text
    }
}
