//! VMD 文件写出
//!
//! 轨道按名称顺序写出，轨道内按帧号升序。名称以 Shift-JIS 编码，
//! 超出字段宽度时在字符边界截断。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;

use crate::Result;

use super::keyframe::{BoneKeyframe, CameraKeyframe, IkKeyframe, MorphKeyframe};
use super::vmd_loader::{
    VmdFile, BONE_NAME_LEN, HEADER_LEN, IK_NAME_LEN, MODEL_NAME_LEN, VMD_HEADER_V2,
};

impl VmdFile {
    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// 序列化为字节
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// 写入任意 Writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut header = [0u8; HEADER_LEN];
        header[..VMD_HEADER_V2.len()].copy_from_slice(VMD_HEADER_V2);
        writer.write_all(&header)?;
        writer.write_all(&encode_shift_jis::<MODEL_NAME_LEN>(&self.model_name))?;

        let motion = &self.motion;

        writer.write_u32::<LittleEndian>(motion.bone_keyframe_count() as u32)?;
        for (name, track) in &motion.bone_tracks {
            let name_bytes = encode_shift_jis::<BONE_NAME_LEN>(name);
            for kf in track.iter() {
                write_bone_keyframe(writer, &name_bytes, kf)?;
            }
        }

        writer.write_u32::<LittleEndian>(motion.morph_keyframe_count() as u32)?;
        for (name, track) in &motion.morph_tracks {
            let name_bytes = encode_shift_jis::<BONE_NAME_LEN>(name);
            for kf in track.iter() {
                write_morph_keyframe(writer, &name_bytes, kf)?;
            }
        }

        writer.write_u32::<LittleEndian>(motion.camera_track.len() as u32)?;
        for kf in motion.camera_track.iter() {
            write_camera_keyframe(writer, kf)?;
        }

        writer.write_u32::<LittleEndian>(motion.light_track.len() as u32)?;
        for kf in motion.light_track.iter() {
            writer.write_u32::<LittleEndian>(kf.frame)?;
            write_vec3(writer, kf.color)?;
            write_vec3(writer, kf.direction)?;
        }

        writer.write_u32::<LittleEndian>(motion.shadow_track.len() as u32)?;
        for kf in motion.shadow_track.iter() {
            writer.write_u32::<LittleEndian>(kf.frame)?;
            writer.write_u8(kf.mode)?;
            writer.write_f32::<LittleEndian>(kf.distance)?;
        }

        writer.write_u32::<LittleEndian>(motion.ik_track.len() as u32)?;
        for kf in motion.ik_track.iter() {
            write_ik_keyframe(writer, kf)?;
        }

        Ok(())
    }
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> std::io::Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)
}

fn write_bone_keyframe<W: Write>(writer: &mut W, name: &[u8], kf: &BoneKeyframe) -> Result<()> {
    writer.write_all(name)?;
    writer.write_u32::<LittleEndian>(kf.frame)?;
    write_vec3(writer, kf.position)?;
    writer.write_f32::<LittleEndian>(kf.rotation.x)?;
    writer.write_f32::<LittleEndian>(kf.rotation.y)?;
    writer.write_f32::<LittleEndian>(kf.rotation.z)?;
    writer.write_f32::<LittleEndian>(kf.rotation.w)?;
    writer.write_all(&kf.curves)?;
    Ok(())
}

fn write_morph_keyframe<W: Write>(writer: &mut W, name: &[u8], kf: &MorphKeyframe) -> Result<()> {
    writer.write_all(name)?;
    writer.write_u32::<LittleEndian>(kf.frame)?;
    writer.write_f32::<LittleEndian>(kf.ratio)?;
    Ok(())
}

fn write_camera_keyframe<W: Write>(writer: &mut W, kf: &CameraKeyframe) -> Result<()> {
    writer.write_u32::<LittleEndian>(kf.frame)?;
    writer.write_f32::<LittleEndian>(kf.distance)?;
    write_vec3(writer, kf.look_at)?;
    write_vec3(writer, kf.rotation)?;
    writer.write_all(&kf.curves)?;
    writer.write_u32::<LittleEndian>(kf.fov)?;
    writer.write_u8(u8::from(kf.perspective_off))?;
    Ok(())
}

fn write_ik_keyframe<W: Write>(writer: &mut W, kf: &IkKeyframe) -> Result<()> {
    writer.write_u32::<LittleEndian>(kf.frame)?;
    writer.write_u8(u8::from(kf.visible))?;
    writer.write_u32::<LittleEndian>(kf.ik_states.len() as u32)?;
    for (name, enabled) in &kf.ik_states {
        writer.write_all(&encode_shift_jis::<IK_NAME_LEN>(name))?;
        writer.write_u8(u8::from(*enabled))?;
    }
    Ok(())
}

/// 编码为定长 Shift-JIS 字段，不足补 0，超长时按字符截断
pub(crate) fn encode_shift_jis<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut len = 0;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(ch.encode_utf8(&mut buf));
        if len + encoded.len() > N {
            break;
        }
        out[len..len + encoded.len()].copy_from_slice(&encoded);
        len += encoded.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Motion, VmdFile};
    use glam::Quat;
    use pretty_assertions::assert_eq;

    fn sample_motion() -> Motion {
        let mut motion = Motion::with_model_name("初音ミク");
        let mut kf = BoneKeyframe::new(12);
        kf.position = Vec3::new(1.25, -2.5, 3.75);
        kf.rotation = Quat::from_rotation_y(0.3);
        for (i, b) in kf.curves.iter_mut().enumerate() {
            *b = i as u8;
        }
        motion.insert_bone_keyframe("センター", kf);
        motion.insert_bone_keyframe("センター", BoneKeyframe::new(0));
        motion.insert_morph_keyframe("笑い", MorphKeyframe::new(34, 0.5));

        let mut cam = CameraKeyframe::new(5);
        cam.distance = -45.0;
        cam.fov = 27;
        motion.insert_camera_keyframe(cam);

        let mut ik = IkKeyframe::new(0);
        ik.ik_states.push(("左足ＩＫ".to_string(), false));
        motion.insert_ik_keyframe(ik);
        motion
    }

    #[test]
    fn test_write_then_read_preserves_frames() {
        let vmd = VmdFile::new(sample_motion());
        let bytes = vmd.to_bytes().unwrap();
        let loaded = VmdFile::load_from_bytes(&bytes).unwrap();

        assert_eq!(loaded.model_name, "初音ミク");
        let track = loaded.motion.bone_track("センター").unwrap();
        assert_eq!(track.len(), 2);
        let kf = track.get(12).unwrap();
        assert_eq!(kf.position, Vec3::new(1.25, -2.5, 3.75));
        assert_eq!(kf.curves[63], 63);
        assert_eq!(loaded.motion.morph_ratio("笑い", 34.0), Some(0.5));
        assert_eq!(loaded.motion.camera_track.get(5).map(|c| c.fov), Some(27));
        assert!(!loaded.motion.is_ik_enabled("左足ＩＫ", 3.0));
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let first = VmdFile::new(sample_motion()).to_bytes().unwrap();
        let reloaded = VmdFile::load_from_bytes(&first).unwrap();
        let second = reloaded.to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_truncates_at_char_boundary() {
        // 8 个全角字符 = 16 字节，只能放下 7 个
        let bytes = encode_shift_jis::<15>("あいうえおかきく");
        assert_eq!(bytes[14], 0);
        let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(&bytes[..14]);
        assert_eq!(decoded, "あいうえおかき");
    }
}
