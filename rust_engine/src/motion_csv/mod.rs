//! 动作 CSV 互转
//!
//! 骨骼与 Morph 关键帧分别写入 `<base>_bone_<时间戳>.csv` 与 `<base>_morph_<时间戳>.csv`。
//! 骨骼 CSV 共 72 列：名称、帧号、位置 3 列、角度 3 列，以及与 VMD 插值块同序的 64 列。
//! 导入时按首个表头单元格判断种类，并自动读入同名的另一半文件。

mod clock;
mod export;
mod import;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

pub use clock::{Clock, FixedClock, SystemClock};
pub use export::{export_motion_csv, export_motion_csv_by_output_path, CsvExport};
pub use import::{import_motion_csv, ImportResult};

pub(crate) const CSV_EXT: &str = "csv";
pub(crate) const VMD_EXT: &str = "vmd";
pub(crate) const BONE_SUFFIX: &str = "bone";
pub(crate) const MORPH_SUFFIX: &str = "morph";
/// 文件名时间戳格式
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub(crate) const BONE_COLUMNS_MIN: usize = 72;
pub(crate) const MORPH_COLUMNS_MIN: usize = 3;

pub(crate) const BONE_CSV_LABEL: &str = "ボーンCSV";
pub(crate) const MORPH_CSV_LABEL: &str = "モーフCSV";

/// 骨骼 CSV 表头
pub const BONE_CSV_HEADER: [&str; 72] = [
    "ボーン名", "フレーム", "位置X", "位置Y", "位置Z", "回転X", "回転Y", "回転Z",
    "【X_x1】", "Y_x1", "Z_x1", "R_x1", "【X_y1】", "Y_y1", "Z_y1", "R_y1",
    "【X_x2】", "Y_x2", "Z_x2", "R_x2", "【X_y2】", "Y_y2", "Z_y2", "R_y2",
    "【Y_x1】", "Z_x1", "R_x1", "X_y1", "【Y_y1】", "Z_y1", "R_y1", "X_x2",
    "【Y_x2】", "Z_x2", "R_x2", "X_y2", "【Y_y2】", "Z_y2", "R_y2", "1",
    "【Z_x1】", "R_x1", "X_y1", "Y_y1", "【Z_y1】", "R_y1", "X_x2", "Y_x2",
    "【Z_x2】", "R_x2", "X_y2", "Y_y2", "【Z_y2】", "R_y2", "1", "0",
    "【R_x1】", "X_y1", "Y_y1", "Z_y1", "【R_y1】", "X_x2", "Y_x2", "Z_x2",
    "【R_x2】", "X_y2", "Y_y2", "Z_y2", "【R_y2】", "01", "00", "00",
];

/// Morph CSV 表头
pub const MORPH_CSV_HEADER: [&str; 3] = ["モーフ名", "フレーム", "大きさ"];

/// 消息键，`{}` 依次代入参数
pub(crate) mod messages {
    pub const NO_DATA: &str = "CSVから読み込めるフレームがありません";
    pub const HEADER_NOT_FOUND: &str = "CSVのヘッダが見つかりません ({})";
    pub const FORMAT_UNKNOWN: &str = "CSVの形式を判定できません ({})";
    pub const COLUMNS_INSUFFICIENT: &str = "{}行目: {}の列数が不足しています ({})";
    pub const PARSE_FAILED: &str = "{}行目: {}列の値を読み取れません ({})";
    pub const VMD_SAVE_FAILED: &str = "VMDの保存に失敗しました ({})";
    pub const BONE_SAVE_FAILED: &str = "ボーンCSVの保存に失敗しました ({})";
    pub const MORPH_SAVE_FAILED: &str = "モーフCSVの保存に失敗しました ({})";
    pub const BONE_MARSHAL_FAILED: &str = "ボーンCSVの変換に失敗しました";
    pub const MORPH_MARSHAL_FAILED: &str = "モーフCSVの変換に失敗しました";
}

/// CSV 种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvKind {
    Bone,
    Morph,
}

impl CsvKind {
    /// 由首个表头单元格判断，忽略 BOM 与首尾空白
    pub fn detect(first_cell: &str) -> Option<Self> {
        match first_cell.trim_start_matches('\u{feff}').trim() {
            "ボーン名" => Some(CsvKind::Bone),
            "モーフ名" => Some(CsvKind::Morph),
            _ => None,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            CsvKind::Bone => BONE_CSV_LABEL,
            CsvKind::Morph => MORPH_CSV_LABEL,
        }
    }

    pub(crate) fn min_columns(self) -> usize {
        match self {
            CsvKind::Bone => BONE_COLUMNS_MIN,
            CsvKind::Morph => MORPH_COLUMNS_MIN,
        }
    }
}

static BONE_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_bone(_\d{8}_\d{6})?\.csv$").expect("骨骼 CSV 文件名正则"));
static MORPH_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_morph(_\d{8}_\d{6})?\.csv$").expect("Morph CSV 文件名正则"));

/// 动作文件 `X.vmd` 对应的 CSV 输出路径 `X.csv`
pub fn default_csv_output_path(motion_path: &Path) -> PathBuf {
    if motion_path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    motion_path.with_extension(CSV_EXT)
}

/// CSV 输入对应的 VMD 输出路径
///
/// `_bone[_时间戳].csv` / `_morph[_时间戳].csv` 后缀替换为 `.vmd`，其它情况只换扩展名。
pub fn default_vmd_output_path(csv_path: &Path) -> PathBuf {
    let text = csv_path.to_string_lossy();
    if text.is_empty() {
        return PathBuf::new();
    }
    for pattern in [&*BONE_FILE_PATTERN, &*MORPH_FILE_PATTERN] {
        if pattern.is_match(&text) {
            return PathBuf::from(pattern.replace(&text, ".vmd").into_owned());
        }
    }
    csv_path.with_extension(VMD_EXT)
}

/// 与输入 CSV 成对的另一半文件路径，文件名不符合约定时为 None
pub(crate) fn sibling_path(csv_path: &Path, kind: CsvKind) -> Option<PathBuf> {
    let text = csv_path.to_string_lossy();
    let (pattern, replacement) = match kind {
        CsvKind::Bone => (&*BONE_FILE_PATTERN, "_morph${1}.csv"),
        CsvKind::Morph => (&*MORPH_FILE_PATTERN, "_bone${1}.csv"),
    };
    if !pattern.is_match(&text) {
        return None;
    }
    Some(PathBuf::from(pattern.replace(&text, replacement).into_owned()))
}

/// 路径末尾的文件名，用作错误参数
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
