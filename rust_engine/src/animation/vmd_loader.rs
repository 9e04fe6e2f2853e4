//! VMD 文件加载器
//!
//! 解析 VMD 动作文件并转换为 Motion 数据。坐标保持 MMD 空间，不做轴翻转。
//! 骨骼与 Morph 之后的段落（相机、照明、阴影、IK）在旧文件中可能缺失。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Quat, Vec3};

use crate::{MmdError, Result};

use super::keyframe::{
    BoneKeyframe, CameraKeyframe, IkKeyframe, LightKeyframe, MorphKeyframe, ShadowKeyframe,
};
use super::motion::Motion;

/// VMD 文件头
pub(crate) const VMD_HEADER_V1: &[u8] = b"Vocaloid Motion Data file";
pub(crate) const VMD_HEADER_V2: &[u8] = b"Vocaloid Motion Data 0002";
pub(crate) const HEADER_LEN: usize = 30;
pub(crate) const MODEL_NAME_LEN: usize = 20;
pub(crate) const BONE_NAME_LEN: usize = 15;
pub(crate) const IK_NAME_LEN: usize = 20;

/// VMD 文件数据
#[derive(Debug, Clone, Default)]
pub struct VmdFile {
    /// 模型名称
    pub model_name: String,
    /// Motion 数据
    pub motion: Motion,
}

impl VmdFile {
    pub fn new(motion: Motion) -> Self {
        Self {
            model_name: motion.model_name.clone(),
            motion,
        }
    }

    /// 从文件路径加载 VMD
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::load_from_reader(&mut reader)
    }

    /// 从字节切片加载 VMD
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = std::io::Cursor::new(bytes);
        Self::load_from_reader(&mut reader)
    }

    /// 从 Reader 加载 VMD
    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| MmdError::VmdParse(format!("Failed to read header: {}", e)))?;

        let is_v1 = &header[..25] == VMD_HEADER_V1;
        let is_v2 = &header[..25] == VMD_HEADER_V2;
        if !is_v1 && !is_v2 {
            return Err(MmdError::VmdParse("Invalid VMD header".to_string()));
        }

        let mut model_name_bytes = [0u8; MODEL_NAME_LEN];
        reader
            .read_exact(&mut model_name_bytes)
            .map_err(|e| MmdError::VmdParse(format!("Failed to read model name: {}", e)))?;
        let model_name = decode_shift_jis(&model_name_bytes);

        let mut motion = Motion::with_model_name(model_name.clone());

        let bone_count = read_u32(reader, "bone keyframe count")?;
        for _ in 0..bone_count {
            let (name, keyframe) = read_bone_keyframe(reader)?;
            motion.insert_bone_keyframe(&name, keyframe);
        }

        let morph_count = read_u32(reader, "morph keyframe count")?;
        for _ in 0..morph_count {
            let (name, keyframe) = read_morph_keyframe(reader)?;
            motion.insert_morph_keyframe(&name, keyframe);
        }

        read_optional_sections(reader, &mut motion);

        log::debug!(
            "VMD 读取完成: 模型={}, 骨骼帧={}, Morph帧={}, 相机帧={}",
            model_name,
            motion.bone_keyframe_count(),
            motion.morph_keyframe_count(),
            motion.camera_track.len()
        );

        Ok(Self { model_name, motion })
    }

    /// 获取最大帧数
    pub fn max_frame(&self) -> u32 {
        self.motion.max_frame()
    }
}

/// 相机、照明、阴影、IK 段落，遇到截断即停止
fn read_optional_sections<R: Read>(reader: &mut R, motion: &mut Motion) {
    let Ok(camera_count) = reader.read_u32::<LittleEndian>() else {
        return;
    };
    for _ in 0..camera_count {
        match read_camera_keyframe(reader) {
            Ok(kf) => motion.insert_camera_keyframe(kf),
            Err(e) => {
                log::warn!("VMD 相机段截断: {}", e);
                return;
            }
        }
    }

    let Ok(light_count) = reader.read_u32::<LittleEndian>() else {
        return;
    };
    for _ in 0..light_count {
        match read_light_keyframe(reader) {
            Ok(kf) => {
                motion.light_track.insert(kf);
            }
            Err(_) => return,
        }
    }

    let Ok(shadow_count) = reader.read_u32::<LittleEndian>() else {
        return;
    };
    for _ in 0..shadow_count {
        match read_shadow_keyframe(reader) {
            Ok(kf) => {
                motion.shadow_track.insert(kf);
            }
            Err(_) => return,
        }
    }

    let Ok(ik_count) = reader.read_u32::<LittleEndian>() else {
        return;
    };
    for _ in 0..ik_count {
        match read_ik_keyframe(reader) {
            Ok(kf) => motion.insert_ik_keyframe(kf),
            Err(e) => {
                log::warn!("VMD IK 段截断: {}", e);
                return;
            }
        }
    }
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|e| MmdError::VmdParse(format!("Failed to read {}: {}", what, e)))
}

fn read_f32<R: Read>(reader: &mut R, what: &str) -> Result<f32> {
    reader
        .read_f32::<LittleEndian>()
        .map_err(|e| MmdError::VmdParse(format!("Failed to read {}: {}", what, e)))
}

fn read_vec3<R: Read>(reader: &mut R, what: &str) -> Result<Vec3> {
    let x = read_f32(reader, what)?;
    let y = read_f32(reader, what)?;
    let z = read_f32(reader, what)?;
    Ok(Vec3::new(x, y, z))
}

fn read_name<R: Read, const N: usize>(reader: &mut R, what: &str) -> Result<String> {
    let mut bytes = [0u8; N];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| MmdError::VmdParse(format!("Failed to read {}: {}", what, e)))?;
    Ok(decode_shift_jis(&bytes))
}

/// 读取骨骼关键帧
fn read_bone_keyframe<R: Read>(reader: &mut R) -> Result<(String, BoneKeyframe)> {
    let name = read_name::<R, BONE_NAME_LEN>(reader, "bone name")?;
    let frame = read_u32(reader, "frame index")?;
    let position = read_vec3(reader, "translation")?;

    // 四元数 (x, y, z, w)
    let rx = read_f32(reader, "rotation")?;
    let ry = read_f32(reader, "rotation")?;
    let rz = read_f32(reader, "rotation")?;
    let rw = read_f32(reader, "rotation")?;
    let rotation = Quat::from_xyzw(rx, ry, rz, rw);
    let len_sq = rotation.length_squared();
    let rotation = if len_sq <= f32::EPSILON {
        Quat::IDENTITY
    } else if (len_sq - 1.0).abs() > 1e-5 {
        rotation.normalize()
    } else {
        rotation
    };

    let mut curves = [0u8; 64];
    reader
        .read_exact(&mut curves)
        .map_err(|e| MmdError::VmdParse(format!("Failed to read interpolation: {}", e)))?;

    Ok((
        name,
        BoneKeyframe {
            frame,
            position,
            rotation,
            curves,
        },
    ))
}

/// 读取 Morph 关键帧
fn read_morph_keyframe<R: Read>(reader: &mut R) -> Result<(String, MorphKeyframe)> {
    let name = read_name::<R, BONE_NAME_LEN>(reader, "morph name")?;
    let frame = read_u32(reader, "frame index")?;
    let ratio = read_f32(reader, "weight")?;
    Ok((name, MorphKeyframe::new(frame, ratio)))
}

/// 读取相机关键帧（61 字节/帧）
fn read_camera_keyframe<R: Read>(reader: &mut R) -> Result<CameraKeyframe> {
    let frame = read_u32(reader, "camera frame index")?;
    let distance = read_f32(reader, "camera distance")?;
    let look_at = read_vec3(reader, "camera look_at")?;
    let rotation = read_vec3(reader, "camera angle")?;

    let mut curves = [0u8; 24];
    reader
        .read_exact(&mut curves)
        .map_err(|e| MmdError::VmdParse(format!("Failed to read camera interpolation: {}", e)))?;

    let fov = read_u32(reader, "camera fov")?;
    let perspective_off = reader
        .read_u8()
        .map_err(|e| MmdError::VmdParse(format!("Failed to read camera perspective flag: {}", e)))?
        != 0;

    Ok(CameraKeyframe {
        frame,
        distance,
        look_at,
        rotation,
        fov,
        perspective_off,
        curves,
    })
}

/// 读取照明关键帧（28 字节/帧）
fn read_light_keyframe<R: Read>(reader: &mut R) -> Result<LightKeyframe> {
    let frame = read_u32(reader, "light frame index")?;
    let color = read_vec3(reader, "light color")?;
    let direction = read_vec3(reader, "light direction")?;
    Ok(LightKeyframe {
        frame,
        color,
        direction,
    })
}

/// 读取阴影关键帧（9 字节/帧）
fn read_shadow_keyframe<R: Read>(reader: &mut R) -> Result<ShadowKeyframe> {
    let frame = read_u32(reader, "shadow frame index")?;
    let mode = reader
        .read_u8()
        .map_err(|e| MmdError::VmdParse(format!("Failed to read shadow mode: {}", e)))?;
    let distance = read_f32(reader, "shadow distance")?;
    Ok(ShadowKeyframe {
        frame,
        mode,
        distance,
    })
}

/// 读取 IK 关键帧
/// 每个 IK 帧包含帧索引、显示标志和多个 IK 开关
fn read_ik_keyframe<R: Read>(reader: &mut R) -> Result<IkKeyframe> {
    let frame = read_u32(reader, "IK frame index")?;
    let visible = reader
        .read_u8()
        .map_err(|e| MmdError::VmdParse(format!("Failed to read IK show flag: {}", e)))?
        != 0;
    let count = read_u32(reader, "IK info count")?;

    let mut keyframe = IkKeyframe::new(frame);
    keyframe.visible = visible;
    for _ in 0..count {
        let name = read_name::<R, IK_NAME_LEN>(reader, "IK name")?;
        let enabled = reader
            .read_u8()
            .map_err(|e| MmdError::VmdParse(format!("Failed to read IK enable flag: {}", e)))?
            != 0;
        keyframe.ik_states.push((name, enabled));
    }
    Ok(keyframe)
}

/// 解码以 NUL 结尾的 Shift-JIS 字符串
pub(crate) fn decode_shift_jis(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(&bytes[..end]);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_header() {
        let bytes = vec![0u8; 64];
        let err = VmdFile::load_from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, MmdError::VmdParse(_)));
    }

    #[test]
    fn test_accepts_file_without_optional_sections() {
        let mut bytes = Vec::new();
        let mut header = [0u8; HEADER_LEN];
        header[..25].copy_from_slice(VMD_HEADER_V2);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&[0u8; MODEL_NAME_LEN]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let vmd = VmdFile::load_from_bytes(&bytes).unwrap();
        assert!(vmd.motion.is_empty());
        assert_eq!(vmd.model_name, "");
    }

    #[test]
    fn test_truncated_bone_section_is_an_error() {
        let mut bytes = Vec::new();
        let mut header = [0u8; HEADER_LEN];
        header[..25].copy_from_slice(VMD_HEADER_V2);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&[0u8; MODEL_NAME_LEN]);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(VmdFile::load_from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_decode_shift_jis_stops_at_nul() {
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("センター");
        let mut bytes = [0u8; 15];
        bytes[..encoded.len()].copy_from_slice(&encoded);
        bytes[encoded.len() + 1] = 0xFD;
        assert_eq!(decode_shift_jis(&bytes), "センター");
    }
}
