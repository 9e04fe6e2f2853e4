//! 骨骼系统和 IK 求解器

mod bone;
mod ik_solver;
mod manager;

pub use bone::{AppendParent, Bone, BoneFlags, BoneTail, IkConfig, IkLink};
pub use ik_solver::IkSolver;
pub use manager::Skeleton;

use glam::{Mat4, Quat, Vec3};

/// 骨骼变换数据
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneTransform {
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// T·R·S
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}
