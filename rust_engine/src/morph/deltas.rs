//! Morph 累积结果

use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};

use crate::model::{MaterialValues, MmdMaterial};

/// 单个顶点的 Morph 差分
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexMorphDelta {
    pub position: Vec3,
    pub uv: Vec2,
    pub uv1: Vec2,
    /// 蒙皮之后加算的位移
    pub after_position: Option<Vec3>,
}

/// 骨骼 Morph 差分
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneMorphDelta {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for BoneMorphDelta {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// 材质 Morph 差分：最终值为 `base * mul + add`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialMorphDelta {
    pub mul: MaterialValues,
    pub add: MaterialValues,
}

impl Default for MaterialMorphDelta {
    fn default() -> Self {
        Self {
            mul: MaterialValues::ONE,
            add: MaterialValues::ZERO,
        }
    }
}

impl MaterialMorphDelta {
    pub fn apply(&self, material: &MmdMaterial) -> MaterialValues {
        material.morphed_values(&self.mul, &self.add)
    }
}

/// 一帧的 Morph 累积结果，按目标 INDEX 分三组
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphDeltas {
    pub vertices: BTreeMap<usize, VertexMorphDelta>,
    pub bones: BTreeMap<usize, BoneMorphDelta>,
    pub materials: BTreeMap<usize, MaterialMorphDelta>,
}

impl MorphDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.bones.is_empty() && self.materials.is_empty()
    }

    pub fn vertex(&self, index: usize) -> Option<&VertexMorphDelta> {
        self.vertices.get(&index)
    }

    pub fn bone(&self, index: usize) -> Option<&BoneMorphDelta> {
        self.bones.get(&index)
    }

    pub fn material(&self, index: usize) -> Option<&MaterialMorphDelta> {
        self.materials.get(&index)
    }

    pub(crate) fn vertex_mut(&mut self, index: usize) -> &mut VertexMorphDelta {
        self.vertices.entry(index).or_default()
    }

    pub(crate) fn bone_mut(&mut self, index: usize) -> &mut BoneMorphDelta {
        self.bones.entry(index).or_default()
    }

    pub(crate) fn material_mut(&mut self, index: usize) -> &mut MaterialMorphDelta {
        self.materials.entry(index).or_default()
    }
}
