//! 每帧的骨骼变形
//!
//! 一帧分物理前、物理后两个 pass 求值。物理前 pass 的结果同时作为运动学刚体
//! 的目标；物理后 pass 先用物理结果替换动态骨骼的全局变换，再沿层级向下传播，
//! 最后求值物理后变形的骨骼。

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use crate::animation::Motion;
use crate::math::{project_to_axis, slerp_shortest};
use crate::model::Model;
use crate::morph::MorphDeltas;
use crate::skeleton::{IkConfig, IkSolver, Skeleton};

use super::BoneDeltas;

/// 付与亲递归的最大深度，超过后截断
pub const MAX_APPEND_DEPTH: u32 = 10;

/// 骨骼变形器，只读借用模型
#[derive(Clone, Copy, Debug)]
pub struct Deformer<'a> {
    model: &'a Model,
}

impl<'a> Deformer<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    fn skeleton(&self) -> &'a Skeleton {
        self.model.skeleton()
    }

    /// 动作中模型没有的骨骼名，变形时忽略
    pub fn unknown_bone_names<'m>(&self, motion: &'m Motion) -> Vec<&'m str> {
        motion
            .bone_names()
            .filter(|name| self.skeleton().find_bone_by_name(name).is_none())
            .collect()
    }

    pub fn compute_morphs(&self, motion: &Motion, frame: f32) -> MorphDeltas {
        self.model
            .morphs()
            .compute_deltas(motion, frame, self.model.materials().len())
    }

    /// 不带物理的完整求值
    pub fn deform(&self, motion: &Motion, frame: f32) -> (BoneDeltas, MorphDeltas) {
        let (mut deltas, morphs) = self.deform_before_physics(motion, frame);
        self.evaluate_pass(motion, frame, &mut deltas, true, &HashMap::new());
        (deltas, morphs)
    }

    /// 物理前 pass
    pub fn deform_before_physics(&self, motion: &Motion, frame: f32) -> (BoneDeltas, MorphDeltas) {
        let morphs = self.compute_morphs(motion, frame);
        let mut deltas = BoneDeltas::rest(self.skeleton(), frame);
        self.load_frame(motion, frame, &morphs, &mut deltas);
        self.evaluate_pass(motion, frame, &mut deltas, false, &HashMap::new());
        (deltas, morphs)
    }

    /// 物理后 pass
    ///
    /// `physics` 为物理求解后的骨骼全局变换（骨骼 INDEX → 矩阵）。
    pub fn deform_after_physics(
        &self,
        motion: &Motion,
        frame: f32,
        deltas: &mut BoneDeltas,
        physics: &HashMap<usize, Mat4>,
    ) {
        self.propagate_physics(deltas, physics);
        if !physics.is_empty() {
            self.resolve_physics_ik(motion, frame, deltas, physics);
        }
        self.evaluate_pass(motion, frame, deltas, true, physics);
    }

    /// 物理前骨骼按物理结果刷新：动态骨骼取物理矩阵，其余沿父骨骼传播
    fn propagate_physics(&self, deltas: &mut BoneDeltas, physics: &HashMap<usize, Mat4>) {
        let skeleton = self.skeleton();
        for &i in skeleton.pass_order(false) {
            match physics.get(&i) {
                Some(global) => deltas.set_global(skeleton, i, *global),
                None => deltas.update_global(skeleton, i),
            }
        }
    }

    /// 重新求解受物理影响的物理前 IK
    ///
    /// IK 骨骼、目标或任一链接位于动态骨骼的子树中时重新求解。
    /// 动态骨骼自身不作为链接参与求解。
    fn resolve_physics_ik(
        &self,
        motion: &Motion,
        frame: f32,
        deltas: &mut BoneDeltas,
        physics: &HashMap<usize, Mat4>,
    ) {
        let skeleton = self.skeleton();
        let count = skeleton.bone_count();
        let mut moved = vec![false; count];
        for &i in physics.keys().filter(|&&i| i < count) {
            for j in skeleton.subtree(i) {
                moved[j] = true;
            }
        }
        let is_moved = |i: usize| moved.get(i).copied().unwrap_or(false);

        let mut solved = false;
        for &i in skeleton.pass_order(false) {
            let bone = &skeleton.bones()[i];
            let Some(ik) = &bone.ik else {
                continue;
            };
            let depends = is_moved(i)
                || is_moved(ik.target_bone)
                || ik.links.iter().any(|l| is_moved(l.bone_index));
            if !depends || !motion.is_ik_enabled(&bone.name, frame) {
                continue;
            }
            let config = IkConfig {
                links: ik
                    .links
                    .iter()
                    .filter(|l| !physics.contains_key(&l.bone_index))
                    .cloned()
                    .collect(),
                ..ik.clone()
            };
            IkSolver::new(i, &config).solve(skeleton, deltas);
            solved = true;
        }
        // 求解时的子树刷新会移动动态骨骼，这里恢复
        if solved {
            self.propagate_physics(deltas, physics);
        }
    }

    /// 刷新 `index` 之下的物理前骨骼，动态骨骼保持物理矩阵
    fn refresh_pre_pass_dependents(
        &self,
        deltas: &mut BoneDeltas,
        index: usize,
        physics: &HashMap<usize, Mat4>,
    ) {
        let skeleton = self.skeleton();
        for j in skeleton.subtree(index).into_iter().skip(1) {
            if skeleton.bones()[j].flags.deform_after_physics {
                continue;
            }
            match physics.get(&j) {
                Some(global) => deltas.set_global(skeleton, j, *global),
                None => deltas.update_global(skeleton, j),
            }
        }
    }

    /// 按 `physics_after` 选择的 pass 求值
    pub fn deform_pass(
        &self,
        motion: &Motion,
        frame: f32,
        physics_after: bool,
        deltas: &mut BoneDeltas,
        physics: &HashMap<usize, Mat4>,
    ) {
        if physics_after {
            self.deform_after_physics(motion, frame, deltas, physics);
        } else {
            let morphs = self.compute_morphs(motion, frame);
            self.load_frame(motion, frame, &morphs, deltas);
            self.evaluate_pass(motion, frame, deltas, false, physics);
        }
    }

    /// 读取动画与骨骼 Morph，得到每个骨骼本帧的平移与旋转
    fn load_frame(&self, motion: &Motion, frame: f32, morphs: &MorphDeltas, deltas: &mut BoneDeltas) {
        for bone in self.skeleton().bones() {
            let animated = motion.bone_transform(&bone.name, frame).unwrap_or_default();
            let mut position = animated.position;
            let mut rotation = animated.rotation;
            if let Some(morph) = morphs.bone(bone.index) {
                position += morph.position;
                rotation = rotation * morph.rotation;
            }
            if let Some(axis) = bone.fixed_axis {
                rotation = project_to_axis(rotation, axis);
            }
            let d = &mut deltas[bone.index];
            d.frame_position = position;
            d.frame_rotation = rotation.normalize();
            d.position = d.frame_position;
            d.rotation = d.frame_rotation;
        }
    }

    fn evaluate_pass(
        &self,
        motion: &Motion,
        frame: f32,
        deltas: &mut BoneDeltas,
        physics_after: bool,
        physics: &HashMap<usize, Mat4>,
    ) {
        let skeleton = self.skeleton();
        let mut evaluated = vec![false; skeleton.bone_count()];
        if physics_after {
            for &i in skeleton.pass_order(false) {
                evaluated[i] = true;
            }
        }

        for &i in skeleton.pass_order(physics_after) {
            if let Some(global) = physics.get(&i) {
                deltas.set_global(skeleton, i, *global);
                evaluated[i] = true;
                if physics_after {
                    self.refresh_pre_pass_dependents(deltas, i, physics);
                }
                continue;
            }

            self.evaluate_bone(deltas, &evaluated, i);
            evaluated[i] = true;

            let bone = &skeleton.bones()[i];
            if let Some(ik) = &bone.ik {
                if motion.is_ik_enabled(&bone.name, frame) {
                    IkSolver::new(i, ik).solve(skeleton, deltas);
                }
            }
            if physics_after {
                self.refresh_pre_pass_dependents(deltas, i, physics);
            }
        }
    }

    fn evaluate_bone(&self, deltas: &mut BoneDeltas, evaluated: &[bool], index: usize) {
        let skeleton = self.skeleton();
        let mut position = deltas[index].frame_position;
        let mut rotation = deltas[index].frame_rotation;

        if let Some(append) = &skeleton.bones()[index].append {
            let source = append.parent_index;
            if append.rotate {
                let effect = if append.local {
                    deltas[source].frame_rotation
                } else {
                    self.effective_rotation(deltas, evaluated, source, 1)
                };
                rotation = rotation * weighted_rotation(effect, append.rate);
            }
            if append.translate {
                let effect = if append.local {
                    deltas[source].frame_position
                } else {
                    self.effective_translation(deltas, evaluated, source, 1)
                };
                position += effect * append.rate;
            }
        }

        let d = &mut deltas[index];
        d.position = position;
        d.rotation = rotation.normalize();
        deltas.update_unit(skeleton, index);
        deltas.update_global(skeleton, index);
    }

    /// 付与亲来源骨骼的有效旋转
    ///
    /// 已求值的骨骼直接使用结果（含 IK），否则沿付与亲链递归。
    fn effective_rotation(&self, deltas: &BoneDeltas, evaluated: &[bool], index: usize, depth: u32) -> Quat {
        if evaluated[index] {
            return deltas[index].rotation;
        }
        let rotation = deltas[index].frame_rotation;
        if depth >= MAX_APPEND_DEPTH {
            return rotation;
        }
        match &self.skeleton().bones()[index].append {
            Some(append) if append.rotate && !append.local => {
                let effect = self.effective_rotation(deltas, evaluated, append.parent_index, depth + 1);
                (rotation * weighted_rotation(effect, append.rate)).normalize()
            }
            _ => rotation,
        }
    }

    fn effective_translation(&self, deltas: &BoneDeltas, evaluated: &[bool], index: usize, depth: u32) -> Vec3 {
        if evaluated[index] {
            return deltas[index].position;
        }
        let position = deltas[index].frame_position;
        if depth >= MAX_APPEND_DEPTH {
            return position;
        }
        match &self.skeleton().bones()[index].append {
            Some(append) if append.translate && !append.local => {
                position + self.effective_translation(deltas, evaluated, append.parent_index, depth + 1) * append.rate
            }
            _ => position,
        }
    }
}

/// `slerp(I, q, rate)`，比例超出 [0, 1] 时按轴角外推
fn weighted_rotation(q: Quat, rate: f32) -> Quat {
    if (0.0..=1.0).contains(&rate) {
        return slerp_shortest(Quat::IDENTITY, q, rate);
    }
    let q = if q.w < 0.0 { -q } else { q };
    let (axis, angle) = q.normalize().to_axis_angle();
    Quat::from_axis_angle(axis, angle * rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{BoneKeyframe, IkKeyframe};
    use crate::model::ModelParts;
    use crate::skeleton::{AppendParent, Bone, IkConfig, IkLink};
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    fn model(bones: Vec<Bone>) -> Model {
        Model::from_parts(ModelParts {
            name: "テスト".to_string(),
            bones,
            ..ModelParts::default()
        })
        .unwrap()
        .0
    }

    fn key(position: Vec3, rotation: Quat) -> BoneKeyframe {
        let mut kf = BoneKeyframe::new(0);
        kf.position = position;
        kf.rotation = rotation;
        kf
    }

    fn append(source: usize, rate: f32) -> AppendParent {
        AppendParent {
            parent_index: source,
            rate,
            rotate: true,
            translate: false,
            local: false,
        }
    }

    #[test]
    fn test_translation_and_parent_rotation() {
        let model = model(vec![
            Bone::new(0, "センター", Vec3::new(0.0, 8.0, 0.0)),
            Bone::new(0, "上半身", Vec3::new(0.0, 10.0, 0.0)).with_parent(0),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe(
            "センター",
            key(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_z(FRAC_PI_2)),
        );
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);

        assert_eq!(deltas[0].global_position(), Vec3::new(1.0, 8.0, 0.0));
        let upper = deltas[1].global_position();
        assert_abs_diff_eq!(upper.x, -1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(upper.y, 8.0, epsilon = 1e-5);
        // 蒙皮矩阵把初始位置映射到当前位置
        let skinned = deltas[1].local_matrix.transform_point3(Vec3::new(0.0, 10.0, 0.0));
        assert!(skinned.abs_diff_eq(upper, 1e-5));
    }

    #[test]
    fn test_unknown_bone_ignored() {
        let model = model(vec![Bone::new(0, "センター", Vec3::ZERO)]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("存在しない", key(Vec3::ONE, Quat::IDENTITY));
        let deformer = Deformer::new(&model);
        assert_eq!(deformer.unknown_bone_names(&motion), vec!["存在しない"]);
        let (deltas, _) = deformer.deform(&motion, 0.0);
        assert_eq!(deltas[0].global_matrix, Mat4::IDENTITY);
    }

    #[test]
    fn test_bone_morph_and_fixed_axis() {
        let model = model(vec![Bone::new(0, "捩", Vec3::ZERO).with_fixed_axis(Vec3::X)]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("捩", key(Vec3::ZERO, Quat::from_rotation_x(0.2)));
        let deformer = Deformer::new(&model);
        let mut morphs = MorphDeltas::new();
        let morph = morphs.bone_mut(0);
        morph.rotation = Quat::from_rotation_y(0.4);
        morph.position = Vec3::Y;

        let mut deltas = BoneDeltas::rest(model.skeleton(), 0.0);
        deformer.load_frame(&motion, 0.0, &morphs, &mut deltas);
        deformer.evaluate_pass(&motion, 0.0, &mut deltas, false, &HashMap::new());

        let (axis, angle) = deltas[0].rotation.to_axis_angle();
        assert_abs_diff_eq!(axis.x.abs(), 1.0, epsilon = 1e-4);
        assert!(angle > 0.0);
        assert_eq!(deltas[0].position, Vec3::Y);
    }

    #[test]
    fn test_append_rotation_rate() {
        let model = model(vec![
            Bone::new(0, "肩", Vec3::ZERO),
            Bone::new(0, "肩C", Vec3::ZERO).with_append(append(0, 0.5)),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("肩", key(Vec3::ZERO, Quat::from_rotation_z(1.0)));
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        let (_, angle) = deltas[1].rotation.to_axis_angle();
        assert_abs_diff_eq!(angle, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_append_negative_rate_inverts() {
        let model = model(vec![
            Bone::new(0, "腕捩", Vec3::ZERO),
            Bone::new(0, "腕捩1", Vec3::ZERO).with_append(append(0, -0.5)),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("腕捩", key(Vec3::ZERO, Quat::from_rotation_x(1.0)));
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        assert!(deltas[1].rotation.abs_diff_eq(Quat::from_rotation_x(-0.5), 1e-4));
    }

    #[test]
    fn test_append_translation() {
        let model = model(vec![
            Bone::new(0, "A", Vec3::ZERO),
            Bone::new(0, "B", Vec3::ZERO).with_append(AppendParent {
                translate: true,
                rotate: false,
                ..append(0, 0.5)
            }),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("A", key(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY));
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        assert_eq!(deltas[1].global_position(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_append_cycle_is_bounded_and_finite() {
        let model = model(vec![
            Bone::new(0, "A", Vec3::ZERO).with_append(append(1, 1.0)),
            Bone::new(0, "B", Vec3::ZERO).with_append(append(0, 1.0)),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("A", key(Vec3::ZERO, Quat::from_rotation_y(0.1)));
        motion.insert_bone_keyframe("B", key(Vec3::ZERO, Quat::from_rotation_y(0.1)));
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        for d in deltas.iter() {
            assert!(d.global_matrix.is_finite());
            assert!(d.rotation.is_normalized());
        }
    }

    fn leg_model() -> Model {
        let ik = IkConfig {
            target_bone: 2,
            loop_count: 40,
            limit_angle: 2.0,
            links: vec![IkLink::new(1), IkLink::new(0)],
        };
        model(vec![
            Bone::new(0, "足", Vec3::new(0.0, 10.0, 0.0)),
            Bone::new(0, "ひざ", Vec3::new(0.0, 5.0, 0.0)).with_parent(0),
            Bone::new(0, "足首", Vec3::ZERO).with_parent(1),
            Bone::new(0, "足ＩＫ", Vec3::ZERO).with_ik(ik),
        ])
    }

    #[test]
    fn test_ik_follows_ik_bone() {
        let model = leg_model();
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("足ＩＫ", key(Vec3::new(0.0, 2.0, 3.0), Quat::IDENTITY));
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        assert!(deltas[2].global_position().abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-2));
    }

    #[test]
    fn test_ik_disabled_by_track() {
        let model = leg_model();
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("足ＩＫ", key(Vec3::new(0.0, 2.0, 3.0), Quat::IDENTITY));
        let mut off = IkKeyframe::new(0);
        off.ik_states.push(("足ＩＫ".to_string(), false));
        motion.insert_ik_keyframe(off);
        let (deltas, _) = Deformer::new(&model).deform(&motion, 0.0);
        assert_eq!(deltas[2].global_position(), Vec3::ZERO);
    }

    #[test]
    fn test_physics_matrix_replaces_global_and_children_follow() {
        let model = model(vec![
            Bone::new(0, "髪", Vec3::new(0.0, 10.0, 0.0)),
            Bone::new(0, "髪先", Vec3::new(0.0, 8.0, 0.0)).with_parent(0),
        ]);
        let motion = Motion::new();
        let deformer = Deformer::new(&model);
        let (mut deltas, _) = deformer.deform_before_physics(&motion, 0.0);

        let physics_global = Mat4::from_translation(Vec3::new(1.0, 10.0, 0.0));
        let physics = HashMap::from([(0, physics_global)]);
        deformer.deform_after_physics(&motion, 0.0, &mut deltas, &physics);

        assert_eq!(deltas[0].global_matrix, physics_global);
        assert!(deltas[1].global_position().abs_diff_eq(Vec3::new(1.0, 8.0, 0.0), 1e-5));
    }

    #[test]
    fn test_after_physics_bone_waits_for_post_pass() {
        let model = model(vec![
            Bone::new(0, "センター", Vec3::ZERO),
            Bone::new(0, "後", Vec3::new(0.0, 1.0, 0.0)).with_parent(0).after_physics(),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("後", key(Vec3::new(0.0, 0.0, 2.0), Quat::IDENTITY));
        let deformer = Deformer::new(&model);
        let (mut deltas, _) = deformer.deform_before_physics(&motion, 0.0);
        assert_eq!(deltas[1].global_position(), Vec3::new(0.0, 1.0, 0.0));

        deformer.deform_after_physics(&motion, 0.0, &mut deltas, &HashMap::new());
        assert_eq!(deltas[1].global_position(), Vec3::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn test_child_follows_rotated_physics_parent() {
        let model = model(vec![
            Bone::new(0, "髪", Vec3::new(0.0, 10.0, 0.0)),
            Bone::new(0, "髪先", Vec3::new(0.0, 8.0, 0.0)).with_parent(0),
        ]);
        let motion = Motion::new();
        let deformer = Deformer::new(&model);
        let (mut deltas, _) = deformer.deform_before_physics(&motion, 0.0);

        let physics_global =
            Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0)) * Mat4::from_rotation_z(FRAC_PI_2);
        let physics = HashMap::from([(0, physics_global)]);
        deformer.deform_after_physics(&motion, 0.0, &mut deltas, &physics);

        let expected = deltas[0].global_matrix * deltas[1].unit_matrix;
        assert!(deltas[1].global_matrix.abs_diff_eq(expected, 1e-5));
        assert!(deltas[1].global_position().abs_diff_eq(Vec3::new(2.0, 10.0, 0.0), 1e-5));
    }

    #[test]
    fn test_pre_pass_child_of_after_physics_bone_is_refreshed() {
        let model = model(vec![
            Bone::new(0, "センター", Vec3::ZERO),
            Bone::new(0, "後", Vec3::new(0.0, 1.0, 0.0)).with_parent(0).after_physics(),
            Bone::new(0, "後先", Vec3::new(0.0, 2.0, 0.0)).with_parent(1),
        ]);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("後", key(Vec3::new(0.0, 0.0, 2.0), Quat::IDENTITY));
        let deformer = Deformer::new(&model);
        let (mut deltas, _) = deformer.deform_before_physics(&motion, 0.0);
        assert_eq!(deltas[2].global_position(), Vec3::new(0.0, 2.0, 0.0));

        deformer.deform_after_physics(&motion, 0.0, &mut deltas, &HashMap::new());
        let expected = deltas[1].global_matrix * deltas[2].unit_matrix;
        assert!(deltas[2].global_matrix.abs_diff_eq(expected, 1e-5));
        assert!(deltas[2].global_position().abs_diff_eq(Vec3::new(0.0, 2.0, 2.0), 1e-5));
    }

    #[test]
    fn test_ik_resolved_after_physics_moves_link() {
        let model = leg_model();
        let goal = Vec3::new(0.0, 2.0, 3.0);
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("足ＩＫ", key(goal, Quat::IDENTITY));
        let deformer = Deformer::new(&model);
        let (mut deltas, _) = deformer.deform_before_physics(&motion, 0.0);
        // 物理前求解需要转动大腿
        assert!(deltas[0].rotation.angle_between(Quat::IDENTITY) > 1e-3);

        // 大腿由物理拉回初始姿势，只剩膝盖可以求解
        let thigh = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let physics = HashMap::from([(0, thigh)]);
        deformer.deform_after_physics(&motion, 0.0, &mut deltas, &physics);

        assert_eq!(deltas[0].global_matrix, thigh);
        let knee = Vec3::new(0.0, 5.0, 0.0);
        assert!(deltas[1].global_position().abs_diff_eq(knee, 1e-5));
        // 膝盖到脚踝长 5，最近距离为 |膝盖到目标距离 - 5|
        let best = ((goal - knee).length() - 5.0).abs();
        let dist = (deltas[2].global_position() - goal).length();
        assert_abs_diff_eq!(dist, best, epsilon = 1e-2);
    }
}
