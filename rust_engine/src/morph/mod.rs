//! Morph 变形系统
//!
//! Morph 偏移是一个带标签的和类型，累积时按标签分派。

mod deltas;
mod manager;
mod morph;

pub use deltas::{MaterialMorphDelta, MorphDeltas, VertexMorphDelta};
pub use manager::MorphManager;
pub use morph::Morph;

use glam::{Quat, Vec3, Vec4};

use crate::model::MaterialValues;

/// Morph 类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MorphKind {
    Group,
    Vertex,
    /// 蒙皮之后再加算的顶点位移
    AfterVertex,
    Bone,
    Uv,
    /// 追加 UV1
    Uv1,
    Material,
}

/// 顶点 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct VertexMorphOffset {
    pub vertex_index: usize,
    pub offset: Vec3,
}

/// UV Morph 偏移，只使用 xy
#[derive(Clone, Debug, PartialEq)]
pub struct UvMorphOffset {
    pub vertex_index: usize,
    pub offset: Vec4,
}

/// 骨骼 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct BoneMorphOffset {
    pub bone_index: usize,
    pub translation: Vec3,
    pub rotation: Quat,
}

/// 材质 Morph 计算方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialCalcMode {
    Multiply,
    Add,
}

/// 材质 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialMorphOffset {
    /// None 表示全部材质
    pub material_index: Option<usize>,
    pub mode: MaterialCalcMode,
    pub values: MaterialValues,
}

/// 组 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMorphOffset {
    pub morph_index: usize,
    pub factor: f32,
}

/// Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub enum MorphOffset {
    Vertex(VertexMorphOffset),
    Uv(UvMorphOffset),
    Bone(BoneMorphOffset),
    Material(MaterialMorphOffset),
    Group(GroupMorphOffset),
}
