//! 动画关键帧

use glam::{Quat, Vec3};

use super::BezierCurve;

/// 骨骼关键帧的默认插值块（四条曲线均为线性）
pub const INITIAL_BONE_CURVES: [u8; 64] = [
    20, 20, 0, 0, 20, 20, 20, 20, 107, 107, 107, 107, 107, 107, 107, 107, //
    20, 20, 20, 20, 20, 20, 20, 107, 107, 107, 107, 107, 107, 107, 107, 0, //
    20, 20, 20, 20, 20, 20, 107, 107, 107, 107, 107, 107, 107, 107, 0, 0, //
    20, 20, 20, 20, 20, 107, 107, 107, 107, 107, 107, 107, 107, 0, 0, 0,
];

/// 相机关键帧的默认插值块（六条曲线均为线性）
pub const INITIAL_CAMERA_CURVES: [u8; 24] = [
    20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, //
    107, 107, 107, 107, 107, 107, 107, 107, 107, 107, 107, 107,
];

/// 关键帧公共接口
pub trait Keyframe: Clone {
    fn frame(&self) -> u32;
}

/// 骨骼关键帧
///
/// 插值块按原始 64 字节保存，冗余字节在读写之间原样保留。
#[derive(Clone, Debug, PartialEq)]
pub struct BoneKeyframe {
    pub frame: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub curves: [u8; 64],
}

impl BoneKeyframe {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            curves: INITIAL_BONE_CURVES,
        }
    }

    fn curve_at(&self, base: usize) -> BezierCurve {
        BezierCurve::new(
            self.curves[base],
            self.curves[base + 4],
            self.curves[base + 8],
            self.curves[base + 12],
        )
    }

    /// X 轴移动曲线（字节 0, 4, 8, 12）
    pub fn curve_x(&self) -> BezierCurve {
        self.curve_at(0)
    }

    /// Y 轴移动曲线（字节 16, 20, 24, 28）
    pub fn curve_y(&self) -> BezierCurve {
        self.curve_at(16)
    }

    /// Z 轴移动曲线（字节 32, 36, 40, 44）
    pub fn curve_z(&self) -> BezierCurve {
        self.curve_at(32)
    }

    /// 旋转曲线（字节 48, 52, 56, 60）
    pub fn curve_rotation(&self) -> BezierCurve {
        self.curve_at(48)
    }
}

impl Keyframe for BoneKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// Morph 关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct MorphKeyframe {
    pub frame: u32,
    pub ratio: f32,
}

impl MorphKeyframe {
    pub fn new(frame: u32, ratio: f32) -> Self {
        Self { frame, ratio }
    }
}

impl Keyframe for MorphKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// 相机关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct CameraKeyframe {
    pub frame: u32,
    pub distance: f32,
    pub look_at: Vec3,
    /// 弧度
    pub rotation: Vec3,
    /// 视角（度）
    pub fov: u32,
    pub perspective_off: bool,
    pub curves: [u8; 24],
}

impl CameraKeyframe {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            distance: 0.0,
            look_at: Vec3::ZERO,
            rotation: Vec3::ZERO,
            fov: 30,
            perspective_off: false,
            curves: INITIAL_CAMERA_CURVES,
        }
    }

    /// 第 `channel` 条曲线：0..6 依次为 X, Y, Z, 旋转, 距离, 视角
    pub fn curve(&self, channel: usize) -> BezierCurve {
        let c = channel.min(5);
        BezierCurve::new(
            self.curves[c],
            self.curves[c + 6],
            self.curves[c + 12],
            self.curves[c + 18],
        )
    }
}

impl Keyframe for CameraKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// 照明关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct LightKeyframe {
    pub frame: u32,
    pub color: Vec3,
    pub direction: Vec3,
}

impl Keyframe for LightKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// 自阴影关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowKeyframe {
    pub frame: u32,
    pub mode: u8,
    pub distance: f32,
}

impl Keyframe for ShadowKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// IK 开关关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct IkKeyframe {
    pub frame: u32,
    pub visible: bool,
    /// (IK 骨骼名, 是否启用)
    pub ik_states: Vec<(String, bool)>,
}

impl IkKeyframe {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            visible: true,
            ik_states: Vec::new(),
        }
    }

    /// 未列出的 IK 视为启用
    pub fn is_enabled(&self, bone_name: &str) -> bool {
        self.ik_states
            .iter()
            .find(|(name, _)| name == bone_name)
            .map_or(true, |(_, enabled)| *enabled)
    }
}

impl Keyframe for IkKeyframe {
    fn frame(&self) -> u32 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_curves_are_linear() {
        let kf = BoneKeyframe::new(0);
        for curve in [kf.curve_x(), kf.curve_y(), kf.curve_z(), kf.curve_rotation()] {
            assert_eq!(curve, BezierCurve::linear());
        }
        let cam = CameraKeyframe::new(0);
        for channel in 0..6 {
            assert_eq!(cam.curve(channel), BezierCurve::linear());
        }
    }

    #[test]
    fn test_curve_byte_positions() {
        let mut kf = BoneKeyframe::new(0);
        for (i, b) in kf.curves.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(kf.curve_x(), BezierCurve::new(0, 4, 8, 12));
        assert_eq!(kf.curve_y(), BezierCurve::new(16, 20, 24, 28));
        assert_eq!(kf.curve_z(), BezierCurve::new(32, 36, 40, 44));
        assert_eq!(kf.curve_rotation(), BezierCurve::new(48, 52, 56, 60));
    }

    #[test]
    fn test_ik_state_defaults_to_enabled() {
        let mut kf = IkKeyframe::new(0);
        kf.ik_states.push(("左足ＩＫ".to_string(), false));
        assert!(!kf.is_enabled("左足ＩＫ"));
        assert!(kf.is_enabled("右足ＩＫ"));
    }
}
