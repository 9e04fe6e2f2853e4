//! 骨骼层级
//!
//! 加载时一次性建立名称索引、子骨骼列表以及物理前后两个 pass 的求值顺序。
//! 建好之后不再修改，可以在多个线程间共享读取。

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::error::{ids, CommonError};

use super::Bone;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    InProgress,
    Done,
}

/// 骨骼层级
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    /// 物理前 pass 的求值顺序
    pre_order: Vec<usize>,
    /// 物理后 pass 的求值顺序
    post_order: Vec<usize>,
    /// 骨骼在所属 pass 中的位置
    rank: Vec<usize>,
}

impl Skeleton {
    /// 建立层级并校验
    ///
    /// 骨骼的 `index` 字段按其在列表中的位置重新编号。
    pub fn new(mut bones: Vec<Bone>) -> Result<Self, CommonError> {
        let count = bones.len();
        let mut name_to_index = HashMap::with_capacity(count);

        for (i, bone) in bones.iter_mut().enumerate() {
            bone.index = i;
            if let Some(prev) = name_to_index.insert(bone.name.clone(), i) {
                return Err(CommonError::validate(
                    ids::MODEL_DUPLICATE_BONE_NAME,
                    "ボーン名「{}」が重複しています (INDEX {} と {})",
                )
                .with_param(&bone.name)
                .with_param(prev)
                .with_param(i));
            }
        }

        for bone in &bones {
            validate_references(bone, count)?;
        }
        check_parent_cycles(&bones)?;

        let mut children = vec![Vec::new(); count];
        for bone in &bones {
            if let Some(parent) = bone.parent_index {
                children[parent].push(bone.index);
            }
        }

        let pre_order = build_pass_order(&bones, false);
        let post_order = build_pass_order(&bones, true);
        let mut rank = vec![0; count];
        for order in [&pre_order, &post_order] {
            for (r, &i) in order.iter().enumerate() {
                rank[i] = r;
            }
        }

        log::debug!(
            "骨骼层级: {} 个骨骼, 物理前 {} / 物理后 {}",
            count,
            pre_order.len(),
            post_order.len()
        );

        Ok(Self {
            bones,
            name_to_index,
            children,
            pre_order,
            post_order,
            rank,
        })
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// 直接子骨骼
    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map_or(&[], Vec::as_slice)
    }

    /// 指定 pass 的求值顺序
    pub fn pass_order(&self, after_physics: bool) -> &[usize] {
        if after_physics {
            &self.post_order
        } else {
            &self.pre_order
        }
    }

    /// 两个 pass 首尾相接的完整顺序
    pub fn full_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.pre_order.iter().chain(self.post_order.iter()).copied()
    }

    /// 骨骼在所属 pass 中的序号
    pub fn layer_rank(&self, index: usize) -> usize {
        self.rank[index]
    }

    /// 相对父骨骼的初始偏移
    pub fn rest_offset(&self, index: usize) -> Vec3 {
        let bone = &self.bones[index];
        match bone.parent_index {
            Some(parent) => bone.position - self.bones[parent].position,
            None => bone.position,
        }
    }

    /// 初始姿势的全局矩阵
    pub fn rest_global(&self, index: usize) -> Mat4 {
        self.bones[index].rest_matrix()
    }

    /// `index` 及其全部后代，父在前
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut out = vec![index];
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            out.extend_from_slice(self.children(current));
            cursor += 1;
        }
        out
    }
}

fn validate_references(bone: &Bone, count: usize) -> Result<(), CommonError> {
    if let Some(parent) = bone.parent_index {
        if parent >= count || parent == bone.index {
            return Err(CommonError::validate(
                ids::MODEL_PARENT_OUT_OF_RANGE,
                "ボーン「{}」の親INDEX {} が範囲外です",
            )
            .with_param(&bone.name)
            .with_param(parent));
        }
    }

    if let Some(ik) = &bone.ik {
        let unknown = std::iter::once(ik.target_bone)
            .chain(ik.links.iter().map(|l| l.bone_index))
            .find(|&i| i >= count);
        if let Some(index) = unknown {
            return Err(CommonError::validate(
                ids::MODEL_IK_UNKNOWN_BONE,
                "IKボーン「{}」が存在しないボーン INDEX {} を参照しています",
            )
            .with_param(&bone.name)
            .with_param(index));
        }
    }

    if let Some(append) = &bone.append {
        if append.parent_index >= count {
            return Err(CommonError::validate(
                ids::MODEL_APPEND_UNKNOWN_BONE,
                "ボーン「{}」の付与親 INDEX {} が存在しません",
            )
            .with_param(&bone.name)
            .with_param(append.parent_index));
        }
    }
    Ok(())
}

/// 沿父链向上走，步数超过骨骼数即说明有环
fn check_parent_cycles(bones: &[Bone]) -> Result<(), CommonError> {
    for bone in bones {
        let mut steps = 0;
        let mut current = bone.parent_index;
        while let Some(parent) = current {
            steps += 1;
            if steps > bones.len() {
                return Err(CommonError::validate(
                    ids::MODEL_PARENT_CYCLE,
                    "ボーン「{}」の親子関係が循環しています",
                )
                .with_param(&bone.name));
            }
            current = bones[parent].parent_index;
        }
    }
    Ok(())
}

/// 先按 (变形阶层, INDEX) 排序，再保证同一 pass 内的依赖先于自身
fn build_pass_order(bones: &[Bone], after_physics: bool) -> Vec<usize> {
    let mut sorted: Vec<usize> = bones
        .iter()
        .filter(|b| b.flags.deform_after_physics == after_physics)
        .map(|b| b.index)
        .collect();
    sorted.sort_by_key(|&i| (bones[i].layer, i));

    let mut state = vec![Visit::Pending; bones.len()];
    let mut order = Vec::with_capacity(sorted.len());
    for &i in &sorted {
        visit(bones, i, after_physics, &mut state, &mut order);
    }
    order
}

fn visit(bones: &[Bone], index: usize, after_physics: bool, state: &mut [Visit], order: &mut Vec<usize>) {
    if state[index] != Visit::Pending {
        return;
    }
    state[index] = Visit::InProgress;

    for dep in dependencies(&bones[index]) {
        // 只考虑同一 pass 内的依赖，另一 pass 的骨骼要么已求值要么稍后求值
        if bones[dep].flags.deform_after_physics == after_physics {
            visit(bones, dep, after_physics, state, order);
        }
    }

    state[index] = Visit::Done;
    order.push(index);
}

fn dependencies(bone: &Bone) -> Vec<usize> {
    let mut deps = Vec::new();
    deps.extend(bone.parent_index);
    if let Some(append) = &bone.append {
        if append.rotate || append.translate {
            deps.push(append.parent_index);
        }
    }
    if let Some(ik) = &bone.ik {
        deps.extend(ik.links.iter().rev().map(|l| l.bone_index));
        deps.push(ik.target_bone);
    }
    deps.retain(|&d| d != bone.index);
    deps
}
