//! Morph 管理器

use std::collections::{HashMap, HashSet};

use glam::Quat;

use crate::animation::Motion;
use crate::math::slerp_shortest;

use super::{
    BoneMorphOffset, MaterialCalcMode, MaterialMorphOffset, Morph, MorphDeltas, MorphKind,
    MorphOffset,
};

/// 比例绝对值小于该值的 Morph 视为未启用
const MIN_RATIO: f32 = 1e-12;

/// Morph 管理器
#[derive(Clone, Debug, Default)]
pub struct MorphManager {
    morphs: Vec<Morph>,
    name_to_index: HashMap<String, usize>,
}

impl MorphManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_morphs(morphs: Vec<Morph>) -> Self {
        let mut manager = Self::new();
        for morph in morphs {
            manager.add_morph(morph);
        }
        manager
    }

    /// 添加 Morph，同名时名称索引指向后加入的一个
    pub fn add_morph(&mut self, morph: Morph) {
        let index = self.morphs.len();
        self.name_to_index.insert(morph.name.clone(), index);
        self.morphs.push(morph);
    }

    /// 通过名称查找 Morph
    pub fn find_morph_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn morph_count(&self) -> usize {
        self.morphs.len()
    }

    pub fn get_morph(&self, index: usize) -> Option<&Morph> {
        self.morphs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Morph> {
        self.morphs.iter()
    }

    /// 计算 `frame` 时刻的 Morph 差分
    ///
    /// 按模型中的 Morph 顺序处理，动作里没有轨道的 Morph 跳过。
    pub fn compute_deltas(&self, motion: &Motion, frame: f32, material_count: usize) -> MorphDeltas {
        let mut deltas = MorphDeltas::new();
        let mut visited = HashSet::new();
        for (index, morph) in self.morphs.iter().enumerate() {
            let Some(ratio) = motion.morph_ratio(&morph.name, frame) else {
                continue;
            };
            self.apply(&mut deltas, index, ratio, material_count, &mut visited);
        }
        deltas
    }

    /// 直接按 (Morph INDEX, 比例) 计算差分
    pub fn compute_deltas_from_ratios(
        &self,
        ratios: &[(usize, f32)],
        material_count: usize,
    ) -> MorphDeltas {
        let mut deltas = MorphDeltas::new();
        let mut visited = HashSet::new();
        for &(index, ratio) in ratios {
            self.apply(&mut deltas, index, ratio, material_count, &mut visited);
        }
        deltas
    }

    fn apply(
        &self,
        deltas: &mut MorphDeltas,
        index: usize,
        ratio: f32,
        material_count: usize,
        visited: &mut HashSet<usize>,
    ) {
        if ratio.abs() < MIN_RATIO {
            return;
        }
        let Some(morph) = self.morphs.get(index) else {
            return;
        };
        // 组 Morph 的环在当前路径上截断
        if !visited.insert(index) {
            return;
        }

        match morph.kind {
            MorphKind::Material => apply_material_morph(deltas, morph, ratio, material_count),
            MorphKind::Group => {
                for offset in &morph.offsets {
                    if let MorphOffset::Group(group) = offset {
                        self.apply(deltas, group.morph_index, ratio * group.factor, material_count, visited);
                    }
                }
            }
            kind => {
                for offset in &morph.offsets {
                    apply_offset(deltas, kind, offset, ratio);
                }
            }
        }

        visited.remove(&index);
    }
}

fn apply_offset(deltas: &mut MorphDeltas, kind: MorphKind, offset: &MorphOffset, ratio: f32) {
    match (kind, offset) {
        (MorphKind::Vertex, MorphOffset::Vertex(v)) => {
            deltas.vertex_mut(v.vertex_index).position += v.offset * ratio;
        }
        (MorphKind::AfterVertex, MorphOffset::Vertex(v)) => {
            let d = deltas.vertex_mut(v.vertex_index);
            let after = d.after_position.get_or_insert(glam::Vec3::ZERO);
            *after += v.offset * ratio;
        }
        (MorphKind::Uv, MorphOffset::Uv(uv)) => {
            deltas.vertex_mut(uv.vertex_index).uv += uv.offset.truncate().truncate() * ratio;
        }
        (MorphKind::Uv1, MorphOffset::Uv(uv)) => {
            deltas.vertex_mut(uv.vertex_index).uv1 += uv.offset.truncate().truncate() * ratio;
        }
        (MorphKind::Bone, MorphOffset::Bone(bone)) => apply_bone_offset(deltas, bone, ratio),
        _ => {
            log::debug!("Morph 类型 {:?} 与偏移不一致，已忽略", kind);
        }
    }
}

fn apply_bone_offset(deltas: &mut MorphDeltas, offset: &BoneMorphOffset, ratio: f32) {
    let d = deltas.bone_mut(offset.bone_index);
    if offset.translation != glam::Vec3::ZERO {
        d.position += offset.translation * ratio;
    }
    if offset.rotation != Quat::IDENTITY {
        let rotation = slerp_shortest(Quat::IDENTITY, offset.rotation, ratio).normalize();
        d.rotation = (rotation * d.rotation).normalize();
    }
}

/// 每个 Morph 内先处理乘算再处理加算
fn apply_material_morph(deltas: &mut MorphDeltas, morph: &Morph, ratio: f32, material_count: usize) {
    for mode in [MaterialCalcMode::Multiply, MaterialCalcMode::Add] {
        for offset in &morph.offsets {
            let MorphOffset::Material(material) = offset else {
                continue;
            };
            if material.mode != mode {
                continue;
            }
            match material.material_index {
                Some(index) if index < material_count => {
                    apply_material_offset(deltas, index, material, ratio);
                }
                Some(_) => {}
                None => {
                    for index in 0..material_count {
                        apply_material_offset(deltas, index, material, ratio);
                    }
                }
            }
        }
    }
}

fn apply_material_offset(deltas: &mut MorphDeltas, index: usize, offset: &MaterialMorphOffset, ratio: f32) {
    let d = deltas.material_mut(index);
    match offset.mode {
        MaterialCalcMode::Multiply => d.mul.mul_lerp(&offset.values, ratio),
        MaterialCalcMode::Add => d.add.add_scaled(&offset.values, ratio),
    }
}
