//! 统一错误类型定义

use serde::Serialize;
use thiserror::Error;

/// 校验器错误类型
///
/// 传播检查中单个解析器的失败记录在观测结果中，
/// 不收敛或超时是 [`crate::PropagationStatus`] 的取值，而不是错误。
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum VerifierError {
    /// 查询参数无效
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 解析器面板或选项配置无效
    #[error("Invalid verifier configuration: {0}")]
    InvalidConfig(String),

    /// 直接查询时面板中所有解析器都失败
    #[error("No resolver answered {0}")]
    Unresolved(String),
}

/// 校验器 Result 类型别名
pub type VerifierResult<T> = std::result::Result<T, VerifierError>;

/// Failure of a single resolver query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LookupError(pub String);
