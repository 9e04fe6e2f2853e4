//! 骨骼节点
//!
//! 只保存加载时确定的静态定义，逐帧状态由 `deform` 模块的 BoneDelta 承载。

use glam::{Mat4, Vec3};

/// IK 链接信息
#[derive(Clone, Debug, PartialEq)]
pub struct IkLink {
    pub bone_index: usize,
    /// 欧拉角限制 (min, max)，弧度
    pub limits: Option<(Vec3, Vec3)>,
}

impl IkLink {
    pub fn new(bone_index: usize) -> Self {
        Self {
            bone_index,
            limits: None,
        }
    }

    pub fn with_limits(bone_index: usize, min: Vec3, max: Vec3) -> Self {
        Self {
            bone_index,
            limits: Some((min, max)),
        }
    }
}

/// IK 配置
#[derive(Clone, Debug, PartialEq)]
pub struct IkConfig {
    /// 末端效果器骨骼
    pub target_bone: usize,
    pub loop_count: u32,
    /// 每次迭代的单位限制角（弧度）
    pub limit_angle: f32,
    /// 从靠近效果器的一端开始排列
    pub links: Vec<IkLink>,
}

/// 付与亲
#[derive(Clone, Debug, PartialEq)]
pub struct AppendParent {
    pub parent_index: usize,
    pub rate: f32,
    pub rotate: bool,
    pub translate: bool,
    /// 使用付与亲的局部变换
    pub local: bool,
}

/// 骨骼尾端
#[derive(Clone, Debug, PartialEq)]
pub enum BoneTail {
    Offset(Vec3),
    Bone(Option<usize>),
}

impl Default for BoneTail {
    fn default() -> Self {
        BoneTail::Offset(Vec3::ZERO)
    }
}

/// 骨骼标志
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoneFlags {
    pub is_rotatable: bool,
    pub is_movable: bool,
    pub is_visible: bool,
    pub is_operable: bool,
    pub deform_after_physics: bool,
}

impl Default for BoneFlags {
    fn default() -> Self {
        Self {
            is_rotatable: true,
            is_movable: false,
            is_visible: true,
            is_operable: true,
            deform_after_physics: false,
        }
    }
}

/// 骨骼节点
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub index: usize,
    pub name: String,
    pub english_name: String,
    /// 初始位置（模型空间）
    pub position: Vec3,
    pub parent_index: Option<usize>,
    /// 变形阶层
    pub layer: i32,
    pub flags: BoneFlags,
    pub tail: BoneTail,
    pub fixed_axis: Option<Vec3>,
    /// 本地轴 (X, Z)
    pub local_axes: Option<(Vec3, Vec3)>,
    pub ik: Option<IkConfig>,
    pub append: Option<AppendParent>,
}

impl Bone {
    pub fn new(index: usize, name: impl Into<String>, position: Vec3) -> Self {
        Self {
            index,
            name: name.into(),
            english_name: String::new(),
            position,
            parent_index: None,
            layer: 0,
            flags: BoneFlags::default(),
            tail: BoneTail::default(),
            fixed_axis: None,
            local_axes: None,
            ik: None,
            append: None,
        }
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent_index = Some(parent);
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_ik(mut self, ik: IkConfig) -> Self {
        self.ik = Some(ik);
        self
    }

    pub fn with_append(mut self, append: AppendParent) -> Self {
        self.append = Some(append);
        self
    }

    pub fn with_fixed_axis(mut self, axis: Vec3) -> Self {
        self.fixed_axis = Some(axis);
        self
    }

    pub fn after_physics(mut self) -> Self {
        self.flags.deform_after_physics = true;
        self
    }

    pub fn is_ik(&self) -> bool {
        self.ik.is_some()
    }

    /// 初始偏移矩阵（平移到初始位置）
    pub fn rest_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
    }

    /// 逆绑定矩阵
    pub fn inverse_rest_matrix(&self) -> Mat4 {
        Mat4::from_translation(-self.position)
    }
}
