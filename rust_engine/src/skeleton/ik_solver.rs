//! IK 求解器（CCD）

use glam::{Quat, Vec3};

use crate::deform::BoneDeltas;
use crate::math::clamp_euler;

use super::bone::IkConfig;
use super::Skeleton;

/// 效果器与目标距离小于该值时提前结束
const CONVERGED_DISTANCE: f32 = 1e-5;
/// 小于该角度的修正忽略
const MIN_ANGLE: f32 = 1e-6;

/// IK 求解器
#[derive(Clone, Debug)]
pub struct IkSolver<'a> {
    pub bone_index: usize,
    pub config: &'a IkConfig,
}

impl<'a> IkSolver<'a> {
    pub fn new(bone_index: usize, config: &'a IkConfig) -> Self {
        Self { bone_index, config }
    }

    /// 求解 IK，返回结束时效果器到目标的距离
    ///
    /// 调用前 IK 骨骼和链上所有骨骼都必须已经求值。链接骨骼的旋转在
    /// 现有动画旋转的基础上修正，每次修正后刷新该链接的整棵子树。
    pub fn solve(&self, skeleton: &Skeleton, deltas: &mut BoneDeltas) -> f32 {
        let target_idx = self.config.target_bone;
        if target_idx >= deltas.len() || self.config.links.is_empty() {
            return 0.0;
        }

        let goal = deltas[self.bone_index].global_position();
        let mut best_dist = (deltas[target_idx].global_position() - goal).length();
        if best_dist < CONVERGED_DISTANCE {
            return best_dist;
        }
        let mut saved: Vec<Quat> = self.link_rotations(deltas);

        for _ in 0..self.config.loop_count {
            self.solve_core(skeleton, deltas, target_idx, goal);

            let dist = (deltas[target_idx].global_position() - goal).length();
            if dist < best_dist {
                best_dist = dist;
                saved = self.link_rotations(deltas);
            } else {
                // 没有改善时恢复最佳结果
                self.restore(skeleton, deltas, &saved);
                break;
            }
            if dist < CONVERGED_DISTANCE {
                break;
            }
        }
        best_dist
    }

    fn solve_core(&self, skeleton: &Skeleton, deltas: &mut BoneDeltas, target_idx: usize, goal: Vec3) {
        for link in &self.config.links {
            let link_idx = link.bone_index;
            if link_idx == target_idx || link_idx >= deltas.len() {
                continue;
            }

            let effector = deltas[target_idx].global_position();

            // 在链接骨骼的本地空间中计算
            let inv_link = deltas[link_idx].global_matrix.inverse();
            let local_effector = inv_link.transform_point3(effector).normalize_or_zero();
            let local_goal = inv_link.transform_point3(goal).normalize_or_zero();
            if local_effector == Vec3::ZERO || local_goal == Vec3::ZERO {
                continue;
            }

            let dot = local_effector.dot(local_goal).clamp(-1.0, 1.0);
            let angle = dot.acos().min(self.config.limit_angle.abs());
            if angle < MIN_ANGLE {
                continue;
            }

            let axis = local_effector.cross(local_goal).normalize_or_zero();
            if axis == Vec3::ZERO {
                continue;
            }

            let mut rotation = (deltas[link_idx].rotation * Quat::from_axis_angle(axis, angle)).normalize();
            if let Some((min, max)) = link.limits {
                rotation = clamp_euler(rotation, min, max);
            }

            deltas[link_idx].rotation = rotation;
            deltas.update_unit(skeleton, link_idx);
            deltas.refresh_subtree(skeleton, link_idx);
        }
    }

    fn link_rotations(&self, deltas: &BoneDeltas) -> Vec<Quat> {
        self.config
            .links
            .iter()
            .map(|l| deltas.get(l.bone_index).map_or(Quat::IDENTITY, |d| d.rotation))
            .collect()
    }

    fn restore(&self, skeleton: &Skeleton, deltas: &mut BoneDeltas, saved: &[Quat]) {
        // 从链根一侧开始恢复，子树刷新时父骨骼已是最终值
        for (link, &rotation) in self.config.links.iter().zip(saved).rev() {
            if link.bone_index < deltas.len() {
                deltas[link.bone_index].rotation = rotation;
                deltas.update_unit(skeleton, link.bone_index);
                deltas.refresh_subtree(skeleton, link.bone_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Bone, IkLink};
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    /// 0: 大腿(0,10,0) - 1: 小腿(0,5,0) - 2: 脚踝(0,0,0)，3: IK 骨骼
    fn leg(ik_position: Vec3, knee_limits: bool) -> (Skeleton, IkConfig) {
        let knee = if knee_limits {
            IkLink::with_limits(1, Vec3::new(-PI, 0.0, 0.0), Vec3::new(-0.008, 0.0, 0.0))
        } else {
            IkLink::new(1)
        };
        let config = IkConfig {
            target_bone: 2,
            loop_count: 40,
            limit_angle: 2.0,
            links: vec![knee, IkLink::new(0)],
        };
        let bones = vec![
            Bone::new(0, "足", Vec3::new(0.0, 10.0, 0.0)),
            Bone::new(0, "ひざ", Vec3::new(0.0, 5.0, 0.0)).with_parent(0),
            Bone::new(0, "足首", Vec3::new(0.0, 0.0, 0.0)).with_parent(1),
            Bone::new(0, "足ＩＫ", ik_position).with_ik(config.clone()),
        ];
        (Skeleton::new(bones).unwrap(), config)
    }

    #[test]
    fn test_reachable_goal_converges() {
        let goal = Vec3::new(0.0, 2.0, 3.0);
        let (skeleton, config) = leg(goal, false);
        let mut deltas = BoneDeltas::rest(&skeleton, 0.0);
        let dist = IkSolver::new(3, &config).solve(&skeleton, &mut deltas);
        assert!(dist < 1e-2, "dist = {dist}");
        assert_abs_diff_eq!(deltas[2].global_position().y, 2.0, epsilon = 1e-2);
    }

    #[test]
    fn test_unreachable_goal_does_not_diverge() {
        let goal = Vec3::new(0.0, -20.0, 0.0);
        let (skeleton, config) = leg(goal, false);
        let mut deltas = BoneDeltas::rest(&skeleton, 0.0);
        let before = (deltas[2].global_position() - goal).length();
        let dist = IkSolver::new(3, &config).solve(&skeleton, &mut deltas);
        assert!(dist <= before + 1e-4);
        assert!(deltas[2].global_matrix.is_finite());
    }

    #[test]
    fn test_knee_limit_respected() {
        let goal = Vec3::new(0.0, 3.0, 2.0);
        let (skeleton, config) = leg(goal, true);
        let mut deltas = BoneDeltas::rest(&skeleton, 0.0);
        IkSolver::new(3, &config).solve(&skeleton, &mut deltas);

        let knee = crate::math::IkEulerOrder::Xyz.decompose(deltas[1].rotation);
        assert!(knee.x <= -0.008 + 1e-3);
        assert_abs_diff_eq!(knee.y, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(knee.z, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_goal_at_effector_is_noop() {
        let (skeleton, config) = leg(Vec3::ZERO, false);
        let mut deltas = BoneDeltas::rest(&skeleton, 0.0);
        let dist = IkSolver::new(3, &config).solve(&skeleton, &mut deltas);
        assert_eq!(dist, 0.0);
        assert_eq!(deltas[0].rotation, Quat::IDENTITY);
    }
}
