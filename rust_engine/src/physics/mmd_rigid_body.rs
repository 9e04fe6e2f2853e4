//! MMD 刚体封装
//!
//! 把模型的刚体定义转成 Rapier 的 RigidBody 与 Collider，并保存刚体相对骨骼的偏移。

use glam::{Mat4, Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use crate::model::{PhysicsMode, RigidBodyDef, RigidBodyShape};

use super::config::PhysicsConfig;

/// MMD 刚体
pub struct MMDRigidBody {
    pub name: String,
    /// 关联的骨骼
    pub bone_index: Option<usize>,
    pub mode: PhysicsMode,
    pub shape: RigidBodyShape,
    /// 碰撞组
    pub group: u8,
    /// 碰撞掩码
    pub group_mask: u16,
    pub rigid_body_handle: Option<RigidBodyHandle>,
    pub collider_handle: Option<ColliderHandle>,
    /// 刚体相对于骨骼的偏移：`bone_rest⁻¹ · rb_rest`
    pub offset_matrix: Mat4,
    pub inv_offset_matrix: Mat4,
    /// 初始姿势（模型空间）
    pub rest_matrix: Mat4,
    /// 创建时的世界变换
    pub initial_transform: Isometry<Real>,
    /// 最近一次推送的骨骼位置，位置跟随骨骼的动态刚体使用
    pub bone_position: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl MMDRigidBody {
    /// 从刚体定义创建
    ///
    /// - `bone_rest`: 关联骨骼的初始全局变换
    /// - `bone_global`: 关联骨骼当前的全局变换
    pub fn from_def(def: &RigidBodyDef, bone_rest: Option<Mat4>, bone_global: Option<Mat4>) -> Self {
        let rest_matrix = def.rest_matrix();
        let offset_matrix = match bone_rest {
            Some(rest) => rest.inverse() * rest_matrix,
            None => rest_matrix,
        };
        let world = bone_global.unwrap_or(Mat4::IDENTITY) * offset_matrix;

        Self {
            name: def.name.clone(),
            bone_index: def.bone_index,
            mode: def.mode,
            shape: def.shape,
            group: def.group.min(15),
            group_mask: def.collision_mask,
            rigid_body_handle: None,
            collider_handle: None,
            offset_matrix,
            inv_offset_matrix: offset_matrix.inverse(),
            rest_matrix,
            initial_transform: mat4_to_isometry(world),
            bone_position: bone_global.map_or(Vec3::ZERO, |m| m.w_axis.truncate()),
            mass: def.mass,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            restitution: def.restitution,
            friction: def.friction,
        }
    }

    /// 是否由物理驱动
    pub fn is_dynamic(&self) -> bool {
        self.mode != PhysicsMode::Static
    }

    /// 创建 Rapier 刚体
    pub fn build_rigid_body(&self, config: &PhysicsConfig) -> RigidBody {
        let body_type = if self.is_dynamic() {
            RigidBodyType::Dynamic
        } else {
            RigidBodyType::KinematicPositionBased
        };

        RigidBodyBuilder::new(body_type)
            .position(self.initial_transform)
            .linear_damping(self.linear_damping * config.linear_damping_scale)
            .angular_damping(self.angular_damping * config.angular_damping_scale)
            .ccd_enabled(false)
            .can_sleep(false)
            .build()
    }

    /// 创建 Rapier 碰撞体
    pub fn build_collider(&self, config: &PhysicsConfig) -> Collider {
        let shape = match self.shape {
            RigidBodyShape::Sphere { radius } => SharedShape::ball(radius),
            RigidBodyShape::Box { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            // Rapier 的胶囊沿 Y 轴，参数为半高与半径
            RigidBodyShape::Capsule { radius, height } => SharedShape::capsule_y(height / 2.0, radius),
        };

        let groups = InteractionGroups::new(
            Group::from_bits_truncate(1 << self.group),
            Group::from_bits_truncate(self.group_mask as u32),
        );

        let builder = ColliderBuilder::new(shape)
            .restitution(self.restitution)
            .friction(self.friction)
            .collision_groups(groups)
            .solver_groups(groups);

        let builder = if self.is_dynamic() {
            builder.mass(self.mass.max(f32::EPSILON) * config.mass_scale)
        } else {
            builder.density(0.0)
        };
        builder.build()
    }

    /// 骨骼全局变换 → 刚体世界变换
    pub fn compute_world_transform(&self, bone_global: Mat4) -> Isometry<Real> {
        mat4_to_isometry(bone_global * self.offset_matrix)
    }

    /// 刚体世界变换 → 骨骼全局变换
    pub fn compute_bone_transform(&self, body: &Isometry<Real>) -> Mat4 {
        let bone = isometry_to_mat4(body) * self.inv_offset_matrix;
        match self.mode {
            PhysicsMode::DynamicWithBonePosition => {
                let mut bone = bone;
                bone.w_axis = self.bone_position.extend(1.0);
                bone
            }
            _ => bone,
        }
    }
}

/// glam 矩阵转 Rapier 等距变换（忽略缩放）
pub fn mat4_to_isometry(mat: Mat4) -> Isometry<Real> {
    let (_, rotation, translation) = mat.to_scale_rotation_translation();
    Isometry::from_parts(
        Translation3::new(translation.x, translation.y, translation.z),
        UnitQuaternion::from_quaternion(Quaternion::new(rotation.w, rotation.x, rotation.y, rotation.z)),
    )
}

/// Rapier 等距变换转 glam 矩阵
pub fn isometry_to_mat4(iso: &Isometry<Real>) -> Mat4 {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion().coords;
    Mat4::from_rotation_translation(Quat::from_xyzw(q.x, q.y, q.z, q.w), Vec3::new(t.x, t.y, t.z))
}

pub fn vec3_to_rapier(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub fn rapier_to_vec3(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isometry_round_trip() {
        let m = Mat4::from_rotation_translation(Quat::from_rotation_y(0.7), Vec3::new(1.0, 2.0, 3.0));
        let back = isometry_to_mat4(&mat4_to_isometry(m));
        assert!(back.abs_diff_eq(m, 1e-5));
    }

    #[test]
    fn test_offset_follows_bone() {
        let mut def = RigidBodyDef::new("髪", RigidBodyShape::Sphere { radius: 0.5 }, PhysicsMode::Static);
        def.position = Vec3::new(0.0, 12.0, 0.0);
        let bone_rest = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let bone_now = Mat4::from_translation(Vec3::new(3.0, 10.0, 0.0));
        let rb = MMDRigidBody::from_def(&def, Some(bone_rest), Some(bone_now));

        let world = isometry_to_mat4(&rb.initial_transform);
        assert!(world.w_axis.truncate().abs_diff_eq(Vec3::new(3.0, 12.0, 0.0), 1e-5));
        let bone = rb.compute_bone_transform(&rb.initial_transform);
        assert!(bone.abs_diff_eq(bone_now, 1e-5));
    }

    #[test]
    fn test_bone_position_kept_for_position_following_body() {
        let def = RigidBodyDef::new(
            "胸",
            RigidBodyShape::Sphere { radius: 0.5 },
            PhysicsMode::DynamicWithBonePosition,
        );
        let mut rb = MMDRigidBody::from_def(&def, None, None);
        rb.bone_position = Vec3::new(0.0, 5.0, 0.0);
        let moved = mat4_to_isometry(Mat4::from_translation(Vec3::new(9.0, 9.0, 9.0)));
        let bone = rb.compute_bone_transform(&moved);
        assert_eq!(bone.w_axis.truncate(), Vec3::new(0.0, 5.0, 0.0));
    }
}
