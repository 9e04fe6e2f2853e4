//! 数学内核
//!
//! 向量、四元数、矩阵直接使用 glam 的 f32 类型，这里只补充 MMD 约定相关的
//! 欧拉角换算、固定轴投影、最短弧 slerp 以及 IK 角度限制分解。

mod euler;
mod quaternion;

pub use euler::{clamp_euler, IkEulerOrder};
pub use quaternion::{
    mmd_degrees_to_quat, quat_from_degrees, quat_from_radians, quat_to_degrees,
    quat_to_mmd_degrees, quat_to_radians, project_to_axis, rotation_between, slerp_shortest,
};

use glam::Mat4;

/// 判断矩阵所有元素是否为有限值
pub fn is_finite_mat4(m: &Mat4) -> bool {
    m.to_cols_array().iter().all(|v| v.is_finite())
}

/// 线性插值
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
