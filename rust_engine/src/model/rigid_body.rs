//! 刚体与关节定义
//!
//! 只描述模型文件中的静态数据，物理世界中的实体由 `physics` 模块构建。

use glam::{Mat4, Vec3};

use crate::math::quat_from_radians;

/// 刚体形状
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RigidBodyShape {
    Sphere { radius: f32 },
    /// 半边长
    Box { half_extents: Vec3 },
    /// 沿 Y 轴，`height` 为圆柱部分的全长
    Capsule { radius: f32, height: f32 },
}

/// 刚体的物理模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicsMode {
    /// 跟随骨骼
    Static,
    /// 完全由物理驱动
    Dynamic,
    /// 物理驱动旋转，位置跟随骨骼
    DynamicWithBonePosition,
}

/// 刚体定义
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBodyDef {
    pub name: String,
    pub bone_index: Option<usize>,
    pub shape: RigidBodyShape,
    /// 碰撞组 0..=15
    pub group: u8,
    /// 可碰撞的组位图
    pub collision_mask: u16,
    pub mode: PhysicsMode,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    /// 初始位置（模型空间）
    pub position: Vec3,
    /// 初始旋转，弧度欧拉角
    pub rotation: Vec3,
}

impl RigidBodyDef {
    pub fn new(name: impl Into<String>, shape: RigidBodyShape, mode: PhysicsMode) -> Self {
        Self {
            name: name.into(),
            bone_index: None,
            shape,
            group: 0,
            collision_mask: 0xFFFF,
            mode,
            mass: 1.0,
            linear_damping: 0.5,
            angular_damping: 0.5,
            restitution: 0.0,
            friction: 0.5,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
        }
    }

    /// 初始姿势矩阵，旋转按 Y·X·Z 合成
    pub fn rest_matrix(&self) -> Mat4 {
        let rotation = quat_from_radians(self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_rotation_translation(rotation, self.position)
    }

    pub fn is_dynamic(&self) -> bool {
        self.mode != PhysicsMode::Static
    }
}

/// 关节定义（6DOF 弹簧）
#[derive(Clone, Debug, PartialEq)]
pub struct JointDef {
    pub name: String,
    pub rigid_body_a: usize,
    pub rigid_body_b: usize,
    pub position: Vec3,
    /// 弧度欧拉角
    pub rotation: Vec3,
    pub translation_min: Vec3,
    pub translation_max: Vec3,
    pub rotation_min: Vec3,
    pub rotation_max: Vec3,
    pub spring_translation: Vec3,
    pub spring_rotation: Vec3,
}

impl JointDef {
    pub fn new(name: impl Into<String>, rigid_body_a: usize, rigid_body_b: usize) -> Self {
        Self {
            name: name.into(),
            rigid_body_a,
            rigid_body_b,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            translation_min: Vec3::ZERO,
            translation_max: Vec3::ZERO,
            rotation_min: Vec3::ZERO,
            rotation_max: Vec3::ZERO,
            spring_translation: Vec3::ZERO,
            spring_rotation: Vec3::ZERO,
        }
    }

    /// 关节的世界矩阵，旋转按 Z·Y·X 合成
    pub fn world_matrix(&self) -> Mat4 {
        let rotation = glam::Quat::from_rotation_z(self.rotation.z)
            * glam::Quat::from_rotation_y(self.rotation.y)
            * glam::Quat::from_rotation_x(self.rotation.x);
        Mat4::from_rotation_translation(rotation, self.position)
    }
}
