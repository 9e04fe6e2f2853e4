//! CSV → 动作
//!
//! 骨骼 CSV 按列顺序读取，Morph CSV 按表头名称定位列。
//! 列数检查在解析之前完成，遇到第一处不足即返回。

use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use glam::Vec3;
use log::{debug, info};

use crate::animation::{BoneKeyframe, Motion, MorphKeyframe, VmdFile};
use crate::error::{ids, CommonError, ErrorKind};
use crate::math::mmd_degrees_to_quat;
use crate::Result;

use super::{
    default_vmd_output_path, file_name, messages, sibling_path, CsvKind, BONE_CSV_HEADER,
    MORPH_CSV_HEADER,
};

/// 导入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    /// 写出的 VMD
    pub output_path: PathBuf,
    /// 实际读入的 CSV，成对文件存在时为两个
    pub sources: Vec<PathBuf>,
    pub bone_frame_count: usize,
    pub morph_frame_count: usize,
}

/// 读入 CSV（以及成对的另一半）并保存为 VMD
///
/// 未指定输出路径时由 [`default_vmd_output_path`] 决定。
/// 骨骼与 Morph 都没有读到任何帧时返回“无数据”错误，不写文件。
pub fn import_motion_csv(csv_path: &Path, output_vmd_path: Option<&Path>) -> Result<ImportResult> {
    let output_path = output_vmd_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_vmd_output_path(csv_path));
    let motion_name = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut motion = Motion::with_model_name(motion_name);

    let kind = append_csv(&mut motion, csv_path)?;
    let mut sources = vec![csv_path.to_path_buf()];

    if let Some(pair) = sibling_path(csv_path, kind) {
        if !same_file_path(csv_path, &pair) && pair.is_file() {
            debug!("ペアCSV読込: {}", pair.display());
            append_csv(&mut motion, &pair)?;
            sources.push(pair);
        }
    }

    let bone_frame_count = motion.bone_keyframe_count();
    let morph_frame_count = motion.morph_keyframe_count();
    if bone_frame_count == 0 && morph_frame_count == 0 {
        return Err(CommonError::validate(ids::CSV_NO_DATA, messages::NO_DATA).into());
    }

    VmdFile::new(motion).save(&output_path).map_err(|e| {
        CommonError::external(ids::CSV_VMD_SAVE_FAILED, messages::VMD_SAVE_FAILED)
            .with_param(file_name(&output_path))
            .with_cause(e)
    })?;

    info!(
        "CSV→VMD: {} (ボーン{}フレーム, モーフ{}フレーム)",
        output_path.display(),
        bone_frame_count,
        morph_frame_count
    );

    Ok(ImportResult {
        output_path,
        sources,
        bone_frame_count,
        morph_frame_count,
    })
}

/// 读入单个 CSV 并追加到动作中，返回其种类
fn append_csv(motion: &mut Motion, path: &Path) -> Result<CsvKind> {
    let records = read_records(path)?;

    let header = match records.first() {
        Some(header) if !header.is_empty() => header,
        _ => {
            return Err(CommonError::validate(ids::CSV_HEADER_NOT_FOUND, messages::HEADER_NOT_FOUND)
                .with_param(file_name(path))
                .into())
        }
    };

    let kind = CsvKind::detect(&header[0]).ok_or_else(|| {
        CommonError::new(ids::CSV_FORMAT_UNKNOWN, ErrorKind::NotSupported, messages::FORMAT_UNKNOWN)
            .with_param(file_name(path))
    })?;

    validate_columns(&records, kind, path)?;

    let count = match kind {
        CsvKind::Bone => append_bone_rows(motion, &records, path)?,
        CsvKind::Morph => append_morph_rows(motion, &records, path)?,
    };
    debug!("{}読込: {} ({}行)", kind.label(), path.display(), count);
    Ok(kind)
}

fn read_records(path: &Path) -> Result<Vec<StringRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    Ok(records)
}

fn is_empty_row(row: &StringRecord) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// 表头与每个非空行的列数都不少于最小值
fn validate_columns(records: &[StringRecord], kind: CsvKind, path: &Path) -> std::result::Result<(), CommonError> {
    let min = kind.min_columns();
    for (index, row) in records.iter().enumerate() {
        if index > 0 && is_empty_row(row) {
            continue;
        }
        if row.len() < min {
            return Err(
                CommonError::validate(ids::CSV_COLUMNS_INSUFFICIENT, messages::COLUMNS_INSUFFICIENT)
                    .with_param(index + 1)
                    .with_param(kind.label())
                    .with_param(file_name(path)),
            );
        }
    }
    Ok(())
}

/// 读取一个数值单元格，空单元格视为默认值
fn parse_cell<T>(
    row: &StringRecord,
    column: usize,
    row_number: usize,
    label: &str,
    path: &Path,
) -> std::result::Result<T, CommonError>
where
    T: FromStr + Default,
{
    let text = row.get(column).unwrap_or_default().trim();
    if text.is_empty() {
        return Ok(T::default());
    }
    text.parse().map_err(|_| {
        CommonError::validate(ids::CSV_PARSE_FAILED, messages::PARSE_FAILED)
            .with_param(row_number)
            .with_param(label)
            .with_param(file_name(path))
    })
}

fn clamp_frame(frame: i64) -> u32 {
    frame.clamp(0, u32::MAX as i64) as u32
}

fn clamp_curve(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

fn append_bone_rows(motion: &mut Motion, records: &[StringRecord], path: &Path) -> Result<usize> {
    let mut count = 0;
    for (index, row) in records.iter().enumerate().skip(1) {
        let name = row.get(0).unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        let row_number = index + 1;
        let cell = |column: usize| -> std::result::Result<f32, CommonError> {
            parse_cell(row, column, row_number, BONE_CSV_HEADER[column], path)
        };

        let frame: i64 = parse_cell(row, 1, row_number, BONE_CSV_HEADER[1], path)?;
        let mut keyframe = BoneKeyframe::new(clamp_frame(frame));
        keyframe.position = Vec3::new(cell(2)?, cell(3)?, cell(4)?);
        keyframe.rotation = mmd_degrees_to_quat(Vec3::new(cell(5)?, cell(6)?, cell(7)?));
        for i in 0..64 {
            let column = 8 + i;
            let value: i64 = parse_cell(row, column, row_number, BONE_CSV_HEADER[column], path)?;
            keyframe.curves[i] = clamp_curve(value);
        }

        motion.insert_bone_keyframe(name, keyframe);
        count += 1;
    }
    Ok(count)
}

fn append_morph_rows(motion: &mut Motion, records: &[StringRecord], path: &Path) -> Result<usize> {
    // 按表头名称定位，找不到时退回固定位置
    let header: Vec<&str> = records
        .first()
        .map(|h| h.iter().map(|c| c.trim_start_matches('\u{feff}').trim()).collect())
        .unwrap_or_default();
    let columns: Vec<usize> = MORPH_CSV_HEADER
        .iter()
        .enumerate()
        .map(|(fallback, label)| header.iter().position(|c| c == label).unwrap_or(fallback))
        .collect();
    let (name_col, frame_col, ratio_col) = (columns[0], columns[1], columns[2]);

    let mut count = 0;
    for (index, row) in records.iter().enumerate().skip(1) {
        let name = row.get(name_col).unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        let row_number = index + 1;
        let frame: i64 = parse_cell(row, frame_col, row_number, MORPH_CSV_HEADER[1], path)?;
        let ratio: f32 = parse_cell(row, ratio_col, row_number, MORPH_CSV_HEADER[2], path)?;
        motion.insert_morph_keyframe(name, MorphKeyframe::new(clamp_frame(frame), ratio));
        count += 1;
    }
    Ok(count)
}

fn same_file_path(left: &Path, right: &Path) -> bool {
    if cfg!(windows) {
        left.to_string_lossy()
            .to_lowercase()
            .eq(&right.to_string_lossy().to_lowercase())
    } else {
        left == right
    }
}
