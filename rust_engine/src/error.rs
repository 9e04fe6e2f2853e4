//! 带稳定编号的通用错误
//!
//! 每个错误携带 5 位编号、分类、消息键（模板）、有序参数以及可选的原因链。
//! 消息的本地化由调用方负责，这里只做参数替换。

use std::error::Error as StdError;
use std::fmt;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 用户可修正的输入问题
    Validate,
    NotFound,
    /// 不支持的格式
    NotSupported,
    /// I/O 或第三方解码失败
    External,
    /// 程序内部不变式被破坏
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validate => "validate",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::External => "external",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// 错误编号
pub mod ids {
    // 动作 CSV
    pub const CSV_NO_DATA: u32 = 15601;
    pub const CSV_HEADER_NOT_FOUND: u32 = 15602;
    pub const CSV_FORMAT_UNKNOWN: u32 = 15603;
    pub const CSV_COLUMNS_INSUFFICIENT: u32 = 15604;
    pub const CSV_PARSE_FAILED: u32 = 15605;
    pub const CSV_VMD_SAVE_FAILED: u32 = 15606;
    pub const CSV_SAVE_FAILED: u32 = 15607;
    pub const CSV_MODEL_INVALID: u32 = 95601;
    pub const CSV_MARSHAL_FAILED: u32 = 95602;

    // 模型校验
    pub const MODEL_DUPLICATE_BONE_NAME: u32 = 14501;
    pub const MODEL_PARENT_OUT_OF_RANGE: u32 = 14502;
    pub const MODEL_IK_UNKNOWN_BONE: u32 = 14503;
    pub const MODEL_RIGID_BODY_UNKNOWN_BONE: u32 = 14504;
    pub const MODEL_JOINT_UNKNOWN_RIGID_BODY: u32 = 14505;
    pub const MODEL_MORPH_UNKNOWN_TARGET: u32 = 14506;
    pub const MODEL_APPEND_UNKNOWN_BONE: u32 = 14507;
    pub const MODEL_PARENT_CYCLE: u32 = 14508;
}

/// 通用错误
#[derive(Debug)]
pub struct CommonError {
    pub id: u32,
    pub kind: ErrorKind,
    pub message_key: String,
    pub params: Vec<String>,
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl CommonError {
    pub fn new(id: u32, kind: ErrorKind, message_key: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            message_key: message_key.into(),
            params: Vec::new(),
            cause: None,
        }
    }

    pub fn validate(id: u32, message_key: impl Into<String>) -> Self {
        Self::new(id, ErrorKind::Validate, message_key)
    }

    pub fn external(id: u32, message_key: impl Into<String>) -> Self {
        Self::new(id, ErrorKind::External, message_key)
    }

    pub fn internal(id: u32, message_key: impl Into<String>) -> Self {
        Self::new(id, ErrorKind::Internal, message_key)
    }

    /// 追加一个参数
    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    /// 设置原因
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 将参数依次代入消息键中的 `{}` 占位符
    pub fn message(&self) -> String {
        let mut out = String::with_capacity(self.message_key.len());
        let mut params = self.params.iter();
        let mut rest = self.message_key.as_str();
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match params.next() {
                Some(p) => out.push_str(p),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.message())?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for CommonError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_substitutes_params_in_order() {
        let err = CommonError::validate(ids::CSV_COLUMNS_INSUFFICIENT, "{}行目: {}の列数が不足しています ({})")
            .with_param(3)
            .with_param("ボーンCSV")
            .with_param("a.csv");
        assert_eq!(err.message(), "3行目: ボーンCSVの列数が不足しています (a.csv)");
        assert_eq!(err.kind, ErrorKind::Validate);
        assert_eq!(err.to_string(), "[15604] 3行目: ボーンCSVの列数が不足しています (a.csv)");
    }

    #[test]
    fn test_cause_is_chained() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = CommonError::external(ids::CSV_SAVE_FAILED, "CSV保存失敗").with_cause(io);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "[15607] CSV保存失敗: disk full");
    }

    #[test]
    fn test_missing_params_keep_placeholder() {
        let err = CommonError::internal(ids::CSV_MODEL_INVALID, "{} / {}").with_param("a");
        assert_eq!(err.message(), "a / {}");
    }
}
