//! 种子区域生长分割的端到端演示.
//!
//! 在合成体数据上走完整条交互链路: 种子拾取 → 默认 ROI →
//! 生长与闭运算 → 手工编辑 → 参数修改 (带确认与门控) → undo/redo.

use em_berry::prelude::*;
use log::{info, warn};

/// 合成一个 64^3 的通道: 暗背景, 中心一团亮度 120 的 "细胞器",
/// 内部带一个单体素暗洞.
fn synthetic_channel() -> Channel {
    let mut channel = Channel::uniform((64, 64, 64), 20, [2.0, 1.0, 1.0]);
    channel.fill_box(&VoxelBox::new((24, 24, 24), (40, 40, 40)), 120);
    channel.fill_box(&VoxelBox::new((32, 32, 32), (32, 32, 32)), 20);
    channel
}

fn report(seg: &Segmentation) {
    let f = seg.filter();
    let v = f.output().read();
    info!(
        "前景体素 {} 个, 体积 {:.1} µm³, 范围 {:?}, 编辑区 {} 个",
        v.count_foreground(),
        v.foreground_um3(),
        v.extent(),
        v.edited_regions().len(),
    );
}

fn main() {
    simple_logger::SimpleLogger::new().init().unwrap();

    let config = SgsConfig {
        default_threshold: 30,
        voi_half_extent: [12, 12, 12],
        ..Default::default()
    };
    let channel = synthetic_channel().into_shared();

    // 用户在亮团附近点了一下, 种子吸附到搜索盒内的最佳体素.
    let seed = best_seed(&channel, (30, 30, 30), &config);
    info!("种子吸附到 {seed:?}, 灰度 {}", channel[seed]);

    let mut filter = SeedGrowFilter::new(channel.clone(), seed, &config);
    let roi = default_roi(seed, &config, &channel.extent()).into_shared();
    filter.set_roi(Some(roi));
    filter.observe(|e| {
        if let FilterEvent::UpdateStarted = e {
            info!("重算开始...");
        }
    });
    filter.update();
    if filter.is_touching_roi() {
        warn!("分割触及 ROI 边界, 结果可能不完整");
    }

    let mut ctl = RefineController::new(Segmentation::new(filter));
    report(ctl.segmentation());

    // 手工抹掉一角, 然后带闭运算重新提交.
    ctl.segmentation()
        .filter()
        .output()
        .write()
        .draw_value(VoxelBox::new((24, 24, 24), (26, 26, 26)), SEG_BG_VALUE);
    info!("手工编辑完成");

    let wide_roi = OrthogonalRoi::new(VoxelBox::from_shape((64, 64, 64))).into_shared();
    match ctl.modify(Some(wide_roi), 30, 2) {
        Ok(applied) => {
            info!("提交成功, 触及 ROI: {}", applied.touching_roi);
            report(ctl.segmentation());
        }
        Err(e) => warn!("提交被拒绝: {e}"),
    }

    // 撤销: 手工编辑按字节恢复.
    ctl.undo();
    info!("撤销后:");
    report(ctl.segmentation());

    ctl.redo();
    info!("重做后:");
    report(ctl.segmentation());
}
