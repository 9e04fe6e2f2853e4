//! 动作 → CSV

use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use log::{info, warn};

use crate::animation::{BoneKeyframe, Motion};
use crate::error::{ids, CommonError};
use crate::math::quat_to_mmd_degrees;
use crate::Result;

use super::clock::Clock;
use super::{
    file_name, messages, BONE_CSV_HEADER, BONE_SUFFIX, CSV_EXT, MORPH_CSV_HEADER, MORPH_SUFFIX,
    TIMESTAMP_FORMAT, VMD_EXT,
};

/// 写出的 CSV 文件，对应轨道为空时不写
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvExport {
    pub bone_path: Option<PathBuf>,
    pub morph_path: Option<PathBuf>,
}

/// 把 VMD 动作导出为骨骼与 Morph 两个 CSV
///
/// 输出放在动作文件旁边。扩展名不是 `.vmd`（不区分大小写）时什么也不做，返回 `Ok(None)`。
pub fn export_motion_csv(
    motion_path: &Path,
    motion: &Motion,
    clock: &dyn Clock,
) -> Result<Option<CsvExport>> {
    let is_vmd = motion_path
        .extension()
        .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case(VMD_EXT));
    if !is_vmd {
        return Ok(None);
    }
    let base = motion_path.with_extension("");
    export_by_base_path(&base, motion, clock).map(Some)
}

/// 以 CSV 输出路径为基准导出，`X.csv` 得到 `X_bone_*.csv` 与 `X_morph_*.csv`
pub fn export_motion_csv_by_output_path(
    output_path: &Path,
    motion: &Motion,
    clock: &dyn Clock,
) -> Result<CsvExport> {
    let is_csv = output_path
        .extension()
        .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case(CSV_EXT));
    let base = if is_csv {
        output_path.with_extension("")
    } else {
        output_path.to_path_buf()
    };
    export_by_base_path(&base, motion, clock)
}

fn export_by_base_path(base: &Path, motion: &Motion, clock: &dyn Clock) -> Result<CsvExport> {
    let timestamp = clock.now().format(TIMESTAMP_FORMAT).to_string();
    let mut exported = CsvExport::default();
    let mut first_error = None;

    if motion.bone_keyframe_count() > 0 {
        let path = output_path(base, BONE_SUFFIX, &timestamp);
        let result = bone_csv_bytes(motion).and_then(|bytes| {
            save_csv(&path, &bytes, messages::BONE_SAVE_FAILED)
        });
        match result {
            Ok(()) => {
                info!("ボーンCSV出力: {} ({}フレーム)", path.display(), motion.bone_keyframe_count());
                exported.bone_path = Some(path);
            }
            Err(e) => first_error = Some(e),
        }
    }

    if motion.morph_keyframe_count() > 0 {
        let path = output_path(base, MORPH_SUFFIX, &timestamp);
        let result = morph_csv_bytes(motion).and_then(|bytes| {
            save_csv(&path, &bytes, messages::MORPH_SAVE_FAILED)
        });
        match result {
            Ok(()) => {
                info!("モーフCSV出力: {} ({}フレーム)", path.display(), motion.morph_keyframe_count());
                exported.morph_path = Some(path);
            }
            Err(e) => match first_error {
                Some(_) => warn!("モーフCSV出力失敗: {}", e),
                None => first_error = Some(e),
            },
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(exported),
    }
}

fn output_path(base: &Path, kind: &str, timestamp: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("_{}_{}.{}", kind, timestamp, CSV_EXT));
    PathBuf::from(name)
}

fn save_csv(path: &Path, bytes: &[u8], message: &str) -> std::result::Result<(), CommonError> {
    std::fs::write(path, bytes).map_err(|e| {
        CommonError::external(ids::CSV_SAVE_FAILED, message)
            .with_param(file_name(path))
            .with_cause(e)
    })
}

/// 角度保留的小数位数对应的倍率
const DEGREE_SCALE: f32 = 1000.0;

/// 角度按 0.001 度取整，`-0` 写成 `0`
///
/// 四元数与欧拉角互转的误差远小于该精度，导入后再导出得到相同的文本。
fn round_degree(value: f32) -> f32 {
    (value * DEGREE_SCALE).round() / DEGREE_SCALE + 0.0
}

/// 一行骨骼关键帧：角度为 MMD 界面显示的度数
fn bone_row(name: &str, keyframe: &BoneKeyframe) -> Vec<String> {
    let degrees = quat_to_mmd_degrees(keyframe.rotation);
    let mut row = Vec::with_capacity(BONE_CSV_HEADER.len());
    row.push(name.to_string());
    row.push(keyframe.frame.to_string());
    for v in [
        keyframe.position.x,
        keyframe.position.y,
        keyframe.position.z,
        round_degree(degrees.x),
        round_degree(degrees.y),
        round_degree(degrees.z),
    ] {
        row.push(v.to_string());
    }
    row.extend(keyframe.curves.iter().map(|c| c.to_string()));
    row
}

fn bone_csv_bytes(motion: &Motion) -> std::result::Result<Vec<u8>, CommonError> {
    let marshal_error = |e: csv::Error| {
        CommonError::internal(ids::CSV_MARSHAL_FAILED, messages::BONE_MARSHAL_FAILED).with_cause(e)
    };
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(BONE_CSV_HEADER).map_err(marshal_error)?;
    for (name, track) in &motion.bone_tracks {
        for keyframe in track.iter() {
            writer.write_record(bone_row(name, keyframe)).map_err(marshal_error)?;
        }
    }
    writer.into_inner().map_err(|e| {
        CommonError::internal(ids::CSV_MARSHAL_FAILED, messages::BONE_MARSHAL_FAILED)
            .with_cause(e.into_error())
    })
}

fn morph_csv_bytes(motion: &Motion) -> std::result::Result<Vec<u8>, CommonError> {
    let marshal_error = |e: csv::Error| {
        CommonError::internal(ids::CSV_MARSHAL_FAILED, messages::MORPH_MARSHAL_FAILED).with_cause(e)
    };
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(MORPH_CSV_HEADER).map_err(marshal_error)?;
    for (name, track) in &motion.morph_tracks {
        for keyframe in track.iter() {
            writer
                .write_record([name.clone(), keyframe.frame.to_string(), keyframe.ratio.to_string()])
                .map_err(marshal_error)?;
        }
    }
    writer.into_inner().map_err(|e| {
        CommonError::internal(ids::CSV_MARSHAL_FAILED, messages::MORPH_MARSHAL_FAILED)
            .with_cause(e.into_error())
    })
}
