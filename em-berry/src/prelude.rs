//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Spacing};

pub use crate::consts::mask::{is_background, is_foreground, SEG_BG_VALUE, SEG_VOXEL_VALUE};

pub use crate::data::{Channel, GridAttr, Output, SegVolume, VoxelBox};

pub use crate::error::{GrowError, ParamError, RefineError};

pub use crate::roi::{OrthogonalRoi, Roi, RoiPtr, SphereRoi};

pub use crate::seg::{FilterEvent, SeedGrowFilter};

pub use crate::history::{SgsModification, UndoCommand, UndoStack};

pub use crate::refine::{Applied, RefineController, Segmentation};

pub use crate::settings::{best_seed, default_roi, SgsConfig};
