//! 骨骼变形
//!
//! 从动作与 Morph 计算每帧的骨骼变换，供物理与渲染使用。

mod deformer;
mod delta;

pub use deformer::{Deformer, MAX_APPEND_DEPTH};
pub use delta::{BoneDelta, BoneDeltas};
