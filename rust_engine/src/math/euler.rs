//! IK 角度限制用的欧拉角分解
//!
//! 被限制的轴放在分解顺序的中间位置，使其落在 asin 的 [-π/2, π/2] 区间内。

use glam::{EulerRot, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;

/// IK 链接的欧拉角分解顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkEulerOrder {
    /// Z·X·Y，X 轴在中间
    Zxy,
    /// X·Y·Z，Y 轴在中间
    Xyz,
    /// Y·Z·X，Z 轴在中间
    Yzx,
}

impl IkEulerOrder {
    /// 根据限制范围选择分解顺序
    ///
    /// X 的限制完全落在 (-π/2, π/2) 内时用 ZXY，否则依次检查 Y、Z。
    pub fn for_limits(min: Vec3, max: Vec3) -> Self {
        if min.x > -FRAC_PI_2 && max.x < FRAC_PI_2 {
            IkEulerOrder::Zxy
        } else if min.y > -FRAC_PI_2 && max.y < FRAC_PI_2 {
            IkEulerOrder::Xyz
        } else {
            IkEulerOrder::Yzx
        }
    }

    /// 分解为 (x, y, z) 三个轴的角度
    pub fn decompose(self, q: Quat) -> Vec3 {
        let q = q.normalize();
        match self {
            IkEulerOrder::Zxy => {
                let (z, x, y) = q.to_euler(EulerRot::ZXY);
                Vec3::new(x, y, z)
            }
            IkEulerOrder::Xyz => {
                let (x, y, z) = q.to_euler(EulerRot::XYZ);
                Vec3::new(x, y, z)
            }
            IkEulerOrder::Yzx => {
                let (y, z, x) = q.to_euler(EulerRot::YZX);
                Vec3::new(x, y, z)
            }
        }
    }

    pub fn compose(self, angles: Vec3) -> Quat {
        match self {
            IkEulerOrder::Zxy => Quat::from_euler(EulerRot::ZXY, angles.z, angles.x, angles.y),
            IkEulerOrder::Xyz => Quat::from_euler(EulerRot::XYZ, angles.x, angles.y, angles.z),
            IkEulerOrder::Yzx => Quat::from_euler(EulerRot::YZX, angles.y, angles.z, angles.x),
        }
    }
}

/// 按 [min, max] 限制旋转的各欧拉分量
///
/// min 大于 max 的轴按交换后的区间处理。
pub fn clamp_euler(q: Quat, min: Vec3, max: Vec3) -> Quat {
    let lo = min.min(max);
    let hi = min.max(max);
    let order = IkEulerOrder::for_limits(lo, hi);
    let angles = order.decompose(q);
    let clamped = angles.max(lo).min(hi);
    order.compose(clamped)
}
