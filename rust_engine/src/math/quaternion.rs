//! 四元数与欧拉角互转
//!
//! 欧拉角到四元数的合成顺序固定为 Y·X·Z（MMD 约定）。

use glam::{EulerRot, Quat, Vec3};

/// 弧度欧拉角 (x, y, z) 转四元数，合成顺序 Y·X·Z
pub fn quat_from_radians(x: f32, y: f32, z: f32) -> Quat {
    Quat::from_euler(EulerRot::YXZ, y, x, z)
}

/// 角度欧拉角 (x, y, z) 转四元数
pub fn quat_from_degrees(x: f32, y: f32, z: f32) -> Quat {
    quat_from_radians(x.to_radians(), y.to_radians(), z.to_radians())
}

/// 四元数转弧度欧拉角，是 [`quat_from_radians`] 的逆
pub fn quat_to_radians(q: Quat) -> Vec3 {
    let (y, x, z) = q.normalize().to_euler(EulerRot::YXZ);
    Vec3::new(x, y, z)
}

pub fn quat_to_degrees(q: Quat) -> Vec3 {
    let r = quat_to_radians(q);
    Vec3::new(r.x.to_degrees(), r.y.to_degrees(), r.z.to_degrees())
}

/// MMD 界面上显示的角度：X 保持，Y 与 Z 取反
pub fn quat_to_mmd_degrees(q: Quat) -> Vec3 {
    let d = quat_to_degrees(q);
    Vec3::new(d.x, -d.y, -d.z)
}

/// [`quat_to_mmd_degrees`] 的逆：读入时 Y 与 Z 取反后再构造
pub fn mmd_degrees_to_quat(d: Vec3) -> Quat {
    quat_from_degrees(d.x, -d.y, -d.z)
}

/// 把旋转投影到固定轴上，只保留绕该轴的分量
///
/// 有符号角度为 `2·atan2(q.xyz·axis, q.w)`。
pub fn project_to_axis(q: Quat, axis: Vec3) -> Quat {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return q;
    }
    let q = q.normalize();
    let angle = 2.0 * q.xyz().dot(axis).atan2(q.w);
    Quat::from_axis_angle(axis, angle)
}

/// 走最短弧的 slerp
///
/// 点积为负时对 `b` 取反；两者几乎重合时退化为归一化线性插值。
pub fn slerp_shortest(a: Quat, b: Quat, t: f32) -> Quat {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    let mut cos = a.dot(b);
    let mut b = b;
    if cos < 0.0 {
        cos = -cos;
        b = -b;
    }
    let (k1, k2) = if cos > 0.9999 {
        (1.0 - t, t)
    } else {
        let sin = (1.0 - cos * cos).sqrt();
        let omega = sin.atan2(cos);
        let inv = 1.0 / sin;
        (((1.0 - t) * omega).sin() * inv, (t * omega).sin() * inv)
    };
    Quat::from_xyzw(
        a.x * k1 + b.x * k2,
        a.y * k1 + b.y * k2,
        a.z * k1 + b.z * k2,
        a.w * k1 + b.w * k2,
    )
    .normalize()
}

/// 把 `from` 方向旋转到 `to` 方向的最小旋转
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    let v0 = from.normalize_or_zero();
    let v1 = to.normalize_or_zero();
    if v0 == Vec3::ZERO || v1 == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let dot = v0.dot(v1);
    if dot >= 1.0 - 1e-7 {
        return Quat::IDENTITY;
    }
    if dot <= -1.0 + 1e-7 {
        let helper = if v0.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
        let axis = v0.cross(helper).normalize();
        return Quat::from_axis_angle(axis, std::f32::consts::PI);
    }
    let cross = v0.cross(v1);
    let s = ((1.0 + dot) * 2.0).sqrt();
    Quat::from_xyzw(cross.x / s, cross.y / s, cross.z / s, s * 0.5).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn same_rotation(a: Quat, b: Quat, eps: f32) -> bool {
        a.dot(b).abs() > 1.0 - eps
    }

    #[test]
    fn test_composition_order_is_yxz() {
        let q = quat_from_radians(0.3, 0.5, 0.7);
        let expected = Quat::from_rotation_y(0.5) * Quat::from_rotation_x(0.3) * Quat::from_rotation_z(0.7);
        assert!(same_rotation(q, expected, 1e-6));
    }

    #[test]
    fn test_radians_round_trip() {
        let q = quat_from_degrees(10.0, 20.0, 30.0);
        let d = quat_to_degrees(q);
        assert_abs_diff_eq!(d.x, 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(d.y, 20.0, epsilon = 1e-3);
        assert_abs_diff_eq!(d.z, 30.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mmd_degrees_negate_y_and_z() {
        let q = quat_from_degrees(10.0, 20.0, 30.0);
        let d = quat_to_mmd_degrees(q);
        assert_abs_diff_eq!(d.x, 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(d.y, -20.0, epsilon = 1e-3);
        assert_abs_diff_eq!(d.z, -30.0, epsilon = 1e-3);
        assert!(same_rotation(mmd_degrees_to_quat(d), q, 1e-6));
    }

    #[test]
    fn test_project_to_axis_keeps_signed_angle() {
        let q = Quat::from_axis_angle(Vec3::X, -0.8) * Quat::from_axis_angle(Vec3::Y, 0.05);
        let p = project_to_axis(q, Vec3::X);
        let (axis, angle) = p.to_axis_angle();
        let signed = if axis.x < 0.0 { -angle } else { angle };
        assert_abs_diff_eq!(signed, -0.8, epsilon = 0.01);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_between_maps_vectors() {
        let q = rotation_between(Vec3::X, Vec3::Y);
        let v = q * Vec3::X;
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-6);
        let q = rotation_between(Vec3::X, -Vec3::X);
        let v = q * Vec3::X;
        assert_abs_diff_eq!(v.x, -1.0, epsilon = 1e-5);
    }

    proptest! {
        #[test]
        fn prop_slerp_takes_shortest_arc(
            ax in -1.0f32..1.0, ay in -1.0f32..1.0, az in -1.0f32..1.0, aa in 0.1f32..3.0,
            bx in -1.0f32..1.0, by in -1.0f32..1.0, bz in -1.0f32..1.0, ba in 0.1f32..3.0,
        ) {
            let axis_a = Vec3::new(ax, ay, az);
            let axis_b = Vec3::new(bx, by, bz);
            prop_assume!(axis_a.length() > 0.1 && axis_b.length() > 0.1);
            let qa = Quat::from_axis_angle(axis_a.normalize(), aa);
            let mut qb = Quat::from_axis_angle(axis_b.normalize(), ba);
            if qa.dot(qb) >= 0.0 {
                qb = -qb;
            }
            let m1 = slerp_shortest(qa, qb, 0.5);
            let m2 = slerp_shortest(qa, -qb, 0.5);
            prop_assert!(same_rotation(m1, m2, 1e-5));
        }
    }
}
