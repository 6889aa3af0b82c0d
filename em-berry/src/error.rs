//! 运行时错误.

use std::error::Error;
use std::fmt;

/// 过滤器参数校验错误.
///
/// 参数校验失败发生在任何过滤器状态被修改之前,
/// 因此拿到该错误时过滤器与撤销栈均保持原样.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// 闭运算半径为负.
    NegativeRadius(i32),

    /// 阈值超出 `[0, 255]` 区间.
    ThresholdOutOfRange(i32),
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeRadius(r) => write!(f, "闭运算半径不能为负: {r}"),
            Self::ThresholdOutOfRange(t) => write!(f, "阈值超出 [0, 255] 区间: {t}"),
        }
    }
}

impl Error for ParamError {}

/// 连通阈值生长的运行时错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
    /// 种子体素位于子卷范围之外.
    ///
    /// 过滤器在调用生长核心之前已经验证过种子在提取窗口内,
    /// 因此该错误在 [`crate::SeedGrowFilter::update`] 中被吸收为空结果,
    /// 不会向上传播.
    SeedOutsideExtent,
}

impl fmt::Display for GrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeedOutsideExtent => write!(f, "种子体素在子卷范围之外"),
        }
    }
}

impl Error for GrowError {}

/// 精化提交被拒绝的原因.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineError {
    /// 参数校验失败.
    Param(ParamError),

    /// 种子体素不在候选 ROI 内. 过滤器与撤销栈均未被修改.
    SeedOutsideRoi,

    /// 输出含有手工编辑, 且用户拒绝丢弃. 整个候选修改被放弃.
    EditsNotConfirmed,
}

impl From<ParamError> for RefineError {
    fn from(value: ParamError) -> Self {
        Self::Param(value)
    }
}

impl fmt::Display for RefineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(e) => write!(f, "{e}"),
            Self::SeedOutsideRoi => write!(f, "无法修改分割: 种子在 ROI 之外"),
            Self::EditsNotConfirmed => write!(f, "用户拒绝丢弃手工编辑, 修改被放弃"),
        }
    }
}

impl Error for RefineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Param(e) => Some(e),
            _ => None,
        }
    }
}
