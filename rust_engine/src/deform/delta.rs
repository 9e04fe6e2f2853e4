//! 一帧的骨骼变形结果

use std::ops::{Index, IndexMut};

use glam::{Mat4, Quat, Vec3};

use crate::skeleton::{BoneTransform, Skeleton};

/// 单个骨骼在某一帧的变换
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneDelta {
    pub bone_index: usize,
    /// 动画与骨骼 Morph 合成后的平移，不含初始偏移
    pub frame_position: Vec3,
    /// 动画与骨骼 Morph 合成后的旋转（已做固定轴投影）
    pub frame_rotation: Quat,
    /// 叠加付与亲之后的平移
    pub position: Vec3,
    /// 叠加付与亲与 IK 之后的旋转
    pub rotation: Quat,
    /// 相对父骨骼的变换
    pub unit_matrix: Mat4,
    /// 模型空间变换
    pub global_matrix: Mat4,
    /// 蒙皮矩阵：`global · rest⁻¹`
    pub local_matrix: Mat4,
}

impl BoneDelta {
    fn rest(skeleton: &Skeleton, index: usize) -> Self {
        let global = skeleton.rest_global(index);
        Self {
            bone_index: index,
            frame_position: Vec3::ZERO,
            frame_rotation: Quat::IDENTITY,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            unit_matrix: Mat4::from_translation(skeleton.rest_offset(index)),
            global_matrix: global,
            local_matrix: Mat4::IDENTITY,
        }
    }

    pub fn global_position(&self) -> Vec3 {
        self.global_matrix.w_axis.truncate()
    }
}

/// 一帧中全部骨骼的变换，按骨骼 INDEX 排列
#[derive(Clone, Debug, PartialEq)]
pub struct BoneDeltas {
    pub frame: f32,
    deltas: Vec<BoneDelta>,
}

impl BoneDeltas {
    /// 全部骨骼处于初始姿势
    pub fn rest(skeleton: &Skeleton, frame: f32) -> Self {
        Self {
            frame,
            deltas: (0..skeleton.bone_count())
                .map(|i| BoneDelta::rest(skeleton, i))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoneDelta> {
        self.deltas.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoneDelta> {
        self.deltas.iter()
    }

    fn parent_global(&self, skeleton: &Skeleton, index: usize) -> Mat4 {
        skeleton
            .get_bone(index)
            .and_then(|b| b.parent_index)
            .map_or(Mat4::IDENTITY, |p| self.deltas[p].global_matrix)
    }

    /// 由 `position` / `rotation` 重新计算相对父骨骼的变换
    pub fn update_unit(&mut self, skeleton: &Skeleton, index: usize) {
        let d = &mut self.deltas[index];
        d.unit_matrix =
            BoneTransform::new(skeleton.rest_offset(index) + d.position, d.rotation, Vec3::ONE).to_matrix();
    }

    /// 用父骨骼的全局变换重新计算全局变换与蒙皮矩阵
    pub fn update_global(&mut self, skeleton: &Skeleton, index: usize) {
        let parent = self.parent_global(skeleton, index);
        let inverse_rest = skeleton.bones()[index].inverse_rest_matrix();
        let d = &mut self.deltas[index];
        d.global_matrix = parent * d.unit_matrix;
        d.local_matrix = d.global_matrix * inverse_rest;
    }

    /// 刷新 `index` 及其全部后代的全局变换
    pub fn refresh_subtree(&mut self, skeleton: &Skeleton, index: usize) {
        for i in skeleton.subtree(index) {
            self.update_global(skeleton, i);
        }
    }

    /// 直接指定全局变换（物理结果），并反推相对父骨骼的变换
    pub fn set_global(&mut self, skeleton: &Skeleton, index: usize, global: Mat4) {
        let parent = self.parent_global(skeleton, index);
        let inverse_rest = skeleton.bones()[index].inverse_rest_matrix();
        let unit = parent.inverse() * global;
        let (_, rotation, translation) = unit.to_scale_rotation_translation();
        let d = &mut self.deltas[index];
        d.global_matrix = global;
        d.unit_matrix = unit;
        d.local_matrix = global * inverse_rest;
        d.rotation = rotation;
        d.position = translation - skeleton.rest_offset(index);
    }

    pub fn global_matrices(&self) -> Vec<Mat4> {
        self.deltas.iter().map(|d| d.global_matrix).collect()
    }

    /// 蒙皮矩阵数组，交给渲染端
    pub fn local_matrices(&self) -> Vec<Mat4> {
        self.deltas.iter().map(|d| d.local_matrix).collect()
    }
}

impl Index<usize> for BoneDeltas {
    type Output = BoneDelta;

    fn index(&self, index: usize) -> &BoneDelta {
        &self.deltas[index]
    }
}

impl IndexMut<usize> for BoneDeltas {
    fn index_mut(&mut self, index: usize) -> &mut BoneDelta {
        &mut self.deltas[index]
    }
}
