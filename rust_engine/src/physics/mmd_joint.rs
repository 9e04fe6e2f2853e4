//! MMD 关节（6DOF 弹簧约束）
//!
//! 用 Rapier 的 GenericJoint 加上限制与电机实现。

use glam::{Mat4, Vec3};
use rapier3d::prelude::*;

use crate::model::JointDef;

use super::config::PhysicsConfig;
use super::mmd_rigid_body::mat4_to_isometry;

/// 上下限之差小于该值的线性轴锁定
const LOCK_EPSILON: f32 = 0.0001;
/// 上下限相同的角度轴给出的最小活动范围（弧度）
const MIN_ANGULAR_RANGE: f32 = 0.1;

const LINEAR_AXES: [(JointAxis, JointAxesMask); 3] = [
    (JointAxis::LinX, JointAxesMask::LIN_X),
    (JointAxis::LinY, JointAxesMask::LIN_Y),
    (JointAxis::LinZ, JointAxesMask::LIN_Z),
];
const ANGULAR_AXES: [JointAxis; 3] = [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ];

/// MMD 关节
pub struct MMDJoint {
    pub name: String,
    pub rigid_body_a: usize,
    pub rigid_body_b: usize,
    pub joint_handle: Option<ImpulseJointHandle>,
    pub linear_lower: Vec3,
    pub linear_upper: Vec3,
    pub angular_lower: Vec3,
    pub angular_upper: Vec3,
    pub linear_spring: Vec3,
    pub angular_spring: Vec3,
    /// 关节在刚体 A 局部空间的变换
    pub local_frame_a: Isometry<Real>,
    /// 关节在刚体 B 局部空间的变换
    pub local_frame_b: Isometry<Real>,
}

impl MMDJoint {
    /// 由两个刚体的初始姿势求出关节在各自局部空间的变换
    pub fn from_def(def: &JointDef, rb_a_rest: Mat4, rb_b_rest: Mat4) -> Self {
        let joint_world = def.world_matrix();
        Self {
            name: def.name.clone(),
            rigid_body_a: def.rigid_body_a,
            rigid_body_b: def.rigid_body_b,
            joint_handle: None,
            linear_lower: def.translation_min,
            linear_upper: def.translation_max,
            angular_lower: def.rotation_min,
            angular_upper: def.rotation_max,
            linear_spring: def.spring_translation,
            angular_spring: def.spring_rotation,
            local_frame_a: mat4_to_isometry(rb_a_rest.inverse() * joint_world),
            local_frame_b: mat4_to_isometry(rb_b_rest.inverse() * joint_world),
        }
    }

    /// 锁定上下限相同的线性轴
    pub fn locked_axes(&self) -> JointAxesMask {
        let mut locked = JointAxesMask::empty();
        for (i, (_, mask)) in LINEAR_AXES.iter().enumerate() {
            if (self.linear_upper[i] - self.linear_lower[i]).abs() < LOCK_EPSILON {
                locked |= *mask;
            }
        }
        locked
    }

    /// 创建 Rapier GenericJoint
    ///
    /// 下限大于上限的轴不设限制；角度轴上下限相同时给一个很小的范围。
    pub fn build_joint(&self, config: &PhysicsConfig) -> GenericJoint {
        let locked = self.locked_axes();
        let mut joint = GenericJointBuilder::new(locked)
            .local_frame1(self.local_frame_a)
            .local_frame2(self.local_frame_b)
            .contacts_enabled(false)
            .build();

        for (i, (axis, mask)) in LINEAR_AXES.iter().enumerate() {
            if locked.contains(*mask) {
                continue;
            }
            let (lower, upper) = (self.linear_lower[i], self.linear_upper[i]);
            if lower <= upper {
                joint.set_limits(*axis, [lower, upper]);
            }
            let spring = self.linear_spring[i];
            if spring != 0.0 {
                let stiffness = spring * config.linear_spring_stiffness_scale;
                let damping = (stiffness * config.linear_spring_damping_factor).abs().sqrt();
                joint.set_motor(*axis, 0.0, 0.0, stiffness, damping);
            }
        }

        for (i, axis) in ANGULAR_AXES.iter().enumerate() {
            let (lower, upper) = (self.angular_lower[i], self.angular_upper[i]);
            if lower <= upper {
                if upper - lower < LOCK_EPSILON {
                    joint.set_limits(*axis, [lower - MIN_ANGULAR_RANGE, lower + MIN_ANGULAR_RANGE]);
                } else {
                    joint.set_limits(*axis, [lower, upper]);
                }
            }
            let spring = self.angular_spring[i];
            if spring != 0.0 {
                let stiffness = spring * config.angular_spring_stiffness_scale;
                let damping = (stiffness * config.angular_spring_damping_factor).abs().sqrt();
                joint.set_motor(*axis, 0.0, 0.0, stiffness, damping);
            }
        }

        joint
    }
}
