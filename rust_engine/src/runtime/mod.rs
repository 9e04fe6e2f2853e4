//! 逐帧调度
//!
//! 每帧：多模型并行做物理前变形 → 串行推送运动学刚体 → 物理世界步进一次 →
//! 串行读取动态刚体 → 多模型并行做物理后变形 → 交给渲染端。

mod animation_loop;

pub use animation_loop::{AnimationLoop, FrameOutput, FrameSink, LoopOptions};
