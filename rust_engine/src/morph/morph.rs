//! Morph 定义

use super::{MorphKind, MorphOffset};

/// Morph 变形
#[derive(Clone, Debug, PartialEq)]
pub struct Morph {
    pub name: String,
    pub english_name: String,
    pub kind: MorphKind,
    pub offsets: Vec<MorphOffset>,
}

impl Morph {
    pub fn new(name: impl Into<String>, kind: MorphKind) -> Self {
        Self {
            name: name.into(),
            english_name: String::new(),
            kind,
            offsets: Vec::new(),
        }
    }

    pub fn with_offset(mut self, offset: MorphOffset) -> Self {
        self.offsets.push(offset);
        self
    }

    /// 偏移的种类是否与 Morph 类型一致
    pub fn accepts(&self, offset: &MorphOffset) -> bool {
        matches!(
            (self.kind, offset),
            (MorphKind::Vertex | MorphKind::AfterVertex, MorphOffset::Vertex(_))
                | (MorphKind::Uv | MorphKind::Uv1, MorphOffset::Uv(_))
                | (MorphKind::Bone, MorphOffset::Bone(_))
                | (MorphKind::Material, MorphOffset::Material(_))
                | (MorphKind::Group, MorphOffset::Group(_))
        )
    }
}
