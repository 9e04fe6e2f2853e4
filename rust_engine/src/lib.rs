//! MMD 动画引擎 - 逐帧动画管线的 Rust 实现
//!
//! 提供以下功能：
//! - VMD 动作读写与关键帧插值
//! - 骨骼层级排序、付与亲和 IK 求解
//! - Morph 变形累积
//! - 基于 Rapier3D 的刚体物理
//! - 动作 CSV 导出与导入
//! - 多模型并行的逐帧调度

pub mod animation;
pub mod deform;
pub mod error;
pub mod math;
pub mod model;
pub mod morph;
pub mod motion_csv;
pub mod physics;
pub mod runtime;
pub mod skeleton;

pub use animation::{Motion, VmdFile};
pub use deform::{BoneDelta, BoneDeltas, Deformer};
pub use error::{CommonError, ErrorKind};
pub use model::Model;
pub use morph::{Morph, MorphDeltas};
pub use motion_csv::{export_motion_csv, import_motion_csv, Clock, FixedClock, SystemClock};
pub use physics::MMDPhysics;
pub use runtime::{AnimationLoop, FrameSink, LoopOptions};
pub use skeleton::{Bone, Skeleton};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VMD parse error: {0}")]
    VmdParse(String),

    #[error("Animation error: {0}")]
    Animation(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl MmdError {
    /// 稳定错误编号（仅 `Common` 变体携带）
    pub fn id(&self) -> Option<u32> {
        match self {
            MmdError::Common(e) => Some(e.id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MmdError>;
