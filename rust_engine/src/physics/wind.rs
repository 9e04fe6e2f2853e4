//! 风力
//!
//! 对动态刚体施加空气阻力与简易升力。风速随时间按两个正弦叠加的阵风变化。

use std::f32::consts::PI;

use glam::Vec3;

use crate::model::RigidBodyShape;

use super::config::WindConfig;

/// 相对速度平方小于该值时不施力
const MIN_RELATIVE_SPEED_SQ: f32 = 1.0e-12;

/// 阵风系数 `1 + r·(0.6·sin(2πft) + 0.4·sin(2π·1.73·f·t + 0.9))`
pub fn gust(config: &WindConfig, time: f32) -> f32 {
    let r = config.randomness.clamp(0.0, 1.0);
    let f = config.turbulence_freq_hz.max(0.0001);
    1.0 + r * (0.6 * (2.0 * PI * f * time).sin() + 0.4 * (2.0 * PI * 1.73 * f * time + 0.9).sin())
}

/// 风速向量
pub fn wind_velocity(config: &WindConfig, time: f32) -> Vec3 {
    config.direction.normalize_or_zero() * config.speed * gust(config, time)
}

/// 迎风方向上的近似截面积
pub fn cross_section_area(shape: &RigidBodyShape, direction: Vec3) -> f32 {
    let d = direction.normalize_or_zero();
    if d == Vec3::ZERO {
        return 1.0;
    }
    let a = d.abs();
    match *shape {
        RigidBodyShape::Sphere { radius } => PI * radius * radius,
        RigidBodyShape::Box { half_extents } => {
            let w = half_extents * 2.0;
            a.x * (w.y * w.z) + a.y * (w.x * w.z) + a.z * (w.x * w.y)
        }
        RigidBodyShape::Capsule { radius, height } => {
            let axial = PI * radius * radius;
            let perpendicular = 2.0 * radius * height + PI * radius * radius;
            a.y * axial + (1.0 - a.y) * perpendicular
        }
    }
}

/// 作用在单个刚体上的风力，相对速度过小时为 None
pub fn wind_force(
    config: &WindConfig,
    wind: Vec3,
    body_velocity: Vec3,
    mass: f32,
    shape: &RigidBodyShape,
) -> Option<Vec3> {
    let relative = body_velocity - wind;
    let speed_sq = relative.length_squared();
    if speed_sq < MIN_RELATIVE_SPEED_SQ {
        return None;
    }
    let direction = relative / speed_sq.sqrt();
    let area = cross_section_area(shape, config.direction);

    let drag = -config.drag_coeff * area * speed_sq * direction;

    let mut lift = Vec3::ZERO;
    if config.lift_coeff > 0.0 {
        let perpendicular = Vec3::Y - Vec3::Y.dot(direction) * direction;
        if perpendicular.length_squared() > 1.0e-8 {
            lift = config.lift_coeff * area * speed_sq * perpendicular.normalize();
        }
    }

    let mut force = drag + lift;
    if config.max_acceleration > 0.0 && mass > 0.0 {
        let magnitude = force.length();
        if magnitude > 0.0 && magnitude / mass > config.max_acceleration {
            force *= mass * config.max_acceleration / magnitude;
        }
    }
    Some(force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config() -> WindConfig {
        WindConfig {
            enabled: true,
            speed: 10.0,
            lift_coeff: 0.0,
            max_acceleration: 0.0,
            ..WindConfig::default()
        }
    }

    #[test]
    fn test_gust_without_randomness_is_one() {
        let c = config();
        for t in [0.0, 0.37, 5.0] {
            assert_eq!(gust(&c, t), 1.0);
        }
    }

    #[test]
    fn test_gust_at_zero_time() {
        let c = WindConfig {
            randomness: 1.0,
            ..config()
        };
        assert_abs_diff_eq!(gust(&c, 0.0), 1.0 + 0.4 * 0.9f32.sin(), epsilon = 1e-6);
    }

    #[test]
    fn test_cross_section_areas() {
        let sphere = RigidBodyShape::Sphere { radius: 2.0 };
        assert_abs_diff_eq!(cross_section_area(&sphere, Vec3::X), 4.0 * PI, epsilon = 1e-5);

        let cube = RigidBodyShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        assert_abs_diff_eq!(cross_section_area(&cube, Vec3::X), 4.0 * 6.0, epsilon = 1e-5);

        let capsule = RigidBodyShape::Capsule { radius: 1.0, height: 2.0 };
        assert_abs_diff_eq!(cross_section_area(&capsule, Vec3::Y), PI, epsilon = 1e-5);
        assert_abs_diff_eq!(cross_section_area(&capsule, Vec3::X), 4.0 + PI, epsilon = 1e-5);
    }

    #[test]
    fn test_drag_pushes_along_wind() {
        let c = config();
        let shape = RigidBodyShape::Sphere { radius: 1.0 };
        let wind = wind_velocity(&c, 0.0);
        let force = wind_force(&c, wind, Vec3::ZERO, 1.0, &shape).unwrap();
        assert!(force.x > 0.0);
        assert_abs_diff_eq!(force.x, 0.8 * PI * 100.0, epsilon = 1e-2);
        assert_abs_diff_eq!(force.y, 0.0);
    }

    #[test]
    fn test_force_clamped_by_max_acceleration() {
        let c = WindConfig {
            max_acceleration: 5.0,
            ..config()
        };
        let shape = RigidBodyShape::Sphere { radius: 1.0 };
        let force = wind_force(&c, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO, 2.0, &shape).unwrap();
        assert_abs_diff_eq!(force.length(), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_no_force_when_moving_with_wind() {
        let c = config();
        let shape = RigidBodyShape::Sphere { radius: 1.0 };
        let wind = Vec3::new(10.0, 0.0, 0.0);
        assert!(wind_force(&c, wind, wind, 1.0, &shape).is_none());
    }
}
