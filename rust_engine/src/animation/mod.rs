//! 动画系统
//!
//! 提供 VMD 动作读写、关键帧轨道与插值。

mod bezier;
mod keyframe;
mod motion;
mod motion_track;
mod vmd_loader;
mod vmd_writer;

pub use bezier::BezierCurve;
pub use keyframe::{
    BoneKeyframe, CameraKeyframe, IkKeyframe, Keyframe, LightKeyframe, MorphKeyframe,
    ShadowKeyframe, INITIAL_BONE_CURVES, INITIAL_CAMERA_CURVES,
};
pub use motion::Motion;
pub use motion_track::{
    frame_ratio, interpolate_bone, BoneFrameTransform, CameraFrameTransform, MotionTrack, Track,
};
pub use vmd_loader::VmdFile;
