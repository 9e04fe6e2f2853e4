//! MMD 材质定义

use glam::{Vec3, Vec4};

/// 材质中可被 Morph 改变的参数
///
/// 乘算记录以 [`MaterialValues::ONE`] 为初值，加算记录以 [`MaterialValues::ZERO`] 为初值。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialValues {
    pub diffuse: Vec4,
    /// RGB + 反射强度
    pub specular: Vec4,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_tint: Vec4,
    pub environment_tint: Vec4,
    pub toon_tint: Vec4,
}

impl MaterialValues {
    pub const ONE: Self = Self {
        diffuse: Vec4::ONE,
        specular: Vec4::ONE,
        ambient: Vec3::ONE,
        edge_color: Vec4::ONE,
        edge_size: 1.0,
        texture_tint: Vec4::ONE,
        environment_tint: Vec4::ONE,
        toon_tint: Vec4::ONE,
    };

    pub const ZERO: Self = Self {
        diffuse: Vec4::ZERO,
        specular: Vec4::ZERO,
        ambient: Vec3::ZERO,
        edge_color: Vec4::ZERO,
        edge_size: 0.0,
        texture_tint: Vec4::ZERO,
        environment_tint: Vec4::ZERO,
        toon_tint: Vec4::ZERO,
    };

    /// 乘算：`self *= lerp(1, offset, ratio)`
    pub fn mul_lerp(&mut self, offset: &MaterialValues, ratio: f32) {
        let l4 = |v: Vec4| Vec4::ONE.lerp(v, ratio);
        self.diffuse *= l4(offset.diffuse);
        self.specular *= l4(offset.specular);
        self.ambient *= Vec3::ONE.lerp(offset.ambient, ratio);
        self.edge_color *= l4(offset.edge_color);
        self.edge_size *= 1.0 + (offset.edge_size - 1.0) * ratio;
        self.texture_tint *= l4(offset.texture_tint);
        self.environment_tint *= l4(offset.environment_tint);
        self.toon_tint *= l4(offset.toon_tint);
    }

    /// 加算：`self += offset * ratio`
    pub fn add_scaled(&mut self, offset: &MaterialValues, ratio: f32) {
        self.diffuse += offset.diffuse * ratio;
        self.specular += offset.specular * ratio;
        self.ambient += offset.ambient * ratio;
        self.edge_color += offset.edge_color * ratio;
        self.edge_size += offset.edge_size * ratio;
        self.texture_tint += offset.texture_tint * ratio;
        self.environment_tint += offset.environment_tint * ratio;
        self.toon_tint += offset.toon_tint * ratio;
    }
}

/// MMD 材质
#[derive(Clone, Debug)]
pub struct MmdMaterial {
    pub name: String,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_strength: f32,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_scale: f32,
    pub texture_index: Option<usize>,
    pub environment_index: Option<usize>,
    pub toon_index: Option<usize>,
    pub draw_flags: u8,
    /// 该材质使用的索引数
    pub index_count: usize,
}

impl MmdMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 是否双面渲染
    pub fn is_double_sided(&self) -> bool {
        (self.draw_flags & 0x01) != 0
    }

    /// 是否绘制边缘
    pub fn has_edge(&self) -> bool {
        (self.draw_flags & 0x10) != 0
    }

    /// 材质本身的参数，纹理系数为 1
    pub fn values(&self) -> MaterialValues {
        MaterialValues {
            diffuse: self.diffuse,
            specular: self.specular.extend(self.specular_strength),
            ambient: self.ambient,
            edge_color: self.edge_color,
            edge_size: self.edge_scale,
            ..MaterialValues::ONE
        }
    }

    /// 应用 Morph 结果：`base * mul + add`
    pub fn morphed_values(&self, mul: &MaterialValues, add: &MaterialValues) -> MaterialValues {
        let base = self.values();
        MaterialValues {
            diffuse: base.diffuse * mul.diffuse + add.diffuse,
            specular: base.specular * mul.specular + add.specular,
            ambient: base.ambient * mul.ambient + add.ambient,
            edge_color: base.edge_color * mul.edge_color + add.edge_color,
            edge_size: base.edge_size * mul.edge_size + add.edge_size,
            texture_tint: base.texture_tint * mul.texture_tint + add.texture_tint,
            environment_tint: base.environment_tint * mul.environment_tint + add.environment_tint,
            toon_tint: base.toon_tint * mul.toon_tint + add.toon_tint,
        }
    }
}

impl Default for MmdMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            specular: Vec3::new(0.0, 0.0, 0.0),
            specular_strength: 0.0,
            ambient: Vec3::new(0.5, 0.5, 0.5),
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_scale: 1.0,
            texture_index: None,
            environment_index: None,
            toon_index: None,
            draw_flags: 0,
            index_count: 0,
        }
    }
}
