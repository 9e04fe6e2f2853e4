//! 模型
//!
//! 加载完成后不可变：骨骼层级、Morph、材质、刚体与关节都在构建时校验一次。
//! 致命问题返回错误，其余问题作为警告随模型一起返回。

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{ids, CommonError};
use crate::morph::{Morph, MorphManager, MorphOffset};
use crate::skeleton::{Bone, Skeleton};

use super::{JointDef, MmdMaterial, RigidBodyDef};

/// 非致命的加载问题
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelWarning {
    TextureIndexOutOfRange { material: String, index: usize },
    TextureMissing { path: String },
    EmptyMorph { name: String },
}

impl fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelWarning::TextureIndexOutOfRange { material, index } => {
                write!(f, "材質「{}」のテクスチャINDEX {} が範囲外です", material, index)
            }
            ModelWarning::TextureMissing { path } => write!(f, "テクスチャ「{}」が見つかりません", path),
            ModelWarning::EmptyMorph { name } => write!(f, "モーフ「{}」にオフセットがありません", name),
        }
    }
}

pub type ModelWarnings = Vec<ModelWarning>;

/// 构建模型用的原始数据
#[derive(Clone, Debug, Default)]
pub struct ModelParts {
    pub name: String,
    pub english_name: String,
    pub bones: Vec<Bone>,
    pub morphs: Vec<Morph>,
    pub materials: Vec<MmdMaterial>,
    pub textures: Vec<String>,
    pub rigid_bodies: Vec<RigidBodyDef>,
    pub joints: Vec<JointDef>,
    pub vertex_count: usize,
}

/// MMD 模型
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub english_name: String,
    skeleton: Skeleton,
    morphs: MorphManager,
    materials: Vec<MmdMaterial>,
    textures: Vec<String>,
    rigid_bodies: Vec<RigidBodyDef>,
    joints: Vec<JointDef>,
    vertex_count: usize,
}

impl Model {
    /// 构建并校验模型
    pub fn from_parts(parts: ModelParts) -> Result<(Self, ModelWarnings), CommonError> {
        let skeleton = Skeleton::new(parts.bones)?;
        let model = Self {
            name: parts.name,
            english_name: parts.english_name,
            skeleton,
            morphs: MorphManager::from_morphs(parts.morphs),
            materials: parts.materials,
            textures: parts.textures,
            rigid_bodies: parts.rigid_bodies,
            joints: parts.joints,
            vertex_count: parts.vertex_count,
        };
        let warnings = model.validate(None)?;
        for warning in &warnings {
            log::warn!("[{}] {}", model.name, warning);
        }
        log::info!(
            "模型「{}」: 骨骼 {}, Morph {}, 材质 {}, 刚体 {}, 关节 {}",
            model.name,
            model.skeleton.bone_count(),
            model.morphs.morph_count(),
            model.materials.len(),
            model.rigid_bodies.len(),
            model.joints.len()
        );
        Ok((model, warnings))
    }

    /// 校验引用关系
    ///
    /// 给出 `base_dir` 时还会检查纹理文件是否存在。
    pub fn validate(&self, base_dir: Option<&Path>) -> Result<ModelWarnings, CommonError> {
        let bone_count = self.skeleton.bone_count();

        for rb in &self.rigid_bodies {
            if let Some(bone) = rb.bone_index {
                if bone >= bone_count {
                    return Err(CommonError::validate(
                        ids::MODEL_RIGID_BODY_UNKNOWN_BONE,
                        "剛体「{}」が存在しないボーン INDEX {} を参照しています",
                    )
                    .with_param(&rb.name)
                    .with_param(bone));
                }
            }
        }

        for joint in &self.joints {
            for rb in [joint.rigid_body_a, joint.rigid_body_b] {
                if rb >= self.rigid_bodies.len() {
                    return Err(CommonError::validate(
                        ids::MODEL_JOINT_UNKNOWN_RIGID_BODY,
                        "ジョイント「{}」が存在しない剛体 INDEX {} を参照しています",
                    )
                    .with_param(&joint.name)
                    .with_param(rb));
                }
            }
        }

        let mut warnings = ModelWarnings::new();
        for morph in self.morphs.iter() {
            if morph.offsets.is_empty() {
                warnings.push(ModelWarning::EmptyMorph {
                    name: morph.name.clone(),
                });
            }
            for offset in &morph.offsets {
                if let Some(target) = self.unknown_morph_target(offset) {
                    return Err(CommonError::validate(
                        ids::MODEL_MORPH_UNKNOWN_TARGET,
                        "モーフ「{}」が存在しない対象 INDEX {} を参照しています",
                    )
                    .with_param(&morph.name)
                    .with_param(target));
                }
            }
        }

        let mut checked = HashSet::new();
        for material in &self.materials {
            let indices = [material.texture_index, material.environment_index, material.toon_index];
            for index in indices.into_iter().flatten() {
                match self.textures.get(index) {
                    None => warnings.push(ModelWarning::TextureIndexOutOfRange {
                        material: material.name.clone(),
                        index,
                    }),
                    Some(path) => {
                        if let Some(dir) = base_dir {
                            if checked.insert(index) && !dir.join(path).exists() {
                                warnings.push(ModelWarning::TextureMissing { path: path.clone() });
                            }
                        }
                    }
                }
            }
        }

        Ok(warnings)
    }

    fn unknown_morph_target(&self, offset: &MorphOffset) -> Option<usize> {
        let (index, limit) = match offset {
            MorphOffset::Vertex(v) => (v.vertex_index, self.vertex_count),
            MorphOffset::Uv(uv) => (uv.vertex_index, self.vertex_count),
            MorphOffset::Bone(b) => (b.bone_index, self.skeleton.bone_count()),
            MorphOffset::Material(m) => (m.material_index?, self.materials.len()),
            MorphOffset::Group(g) => (g.morph_index, self.morphs.morph_count()),
        };
        (index >= limit).then_some(index)
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn morphs(&self) -> &MorphManager {
        &self.morphs
    }

    pub fn materials(&self) -> &[MmdMaterial] {
        &self.materials
    }

    pub fn textures(&self) -> &[String] {
        &self.textures
    }

    pub fn rigid_bodies(&self) -> &[RigidBodyDef] {
        &self.rigid_bodies
    }

    pub fn joints(&self) -> &[JointDef] {
        &self.joints
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// 由动态刚体驱动的骨骼
    pub fn dynamic_bone_indices(&self) -> HashSet<usize> {
        self.rigid_bodies
            .iter()
            .filter(|rb| rb.is_dynamic())
            .filter_map(|rb| rb.bone_index)
            .collect()
    }
}
