// ==========================================
// 产线停机核心 - API层错误类型
// ==========================================
// 职责: 将引擎/仓储错误转换为带稳定错误码的用户可处理错误
// 传输层（HTTP 等）按 error_code() 映射响应码
// ==========================================

use crate::engine::error::DowntimeError;
use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("无法解析的时间: {0}")]
    InvalidTimestamp(String),

    #[error("缺少定位字段: {0}")]
    MissingSelector(String),

    // ==========================================
    // 解析错误
    // ==========================================
    #[error("未找到生产批次: {0}")]
    RunNotFound(String),

    #[error("未找到停机原因主数据: {0}")]
    CatalogEntryNotFound(String),

    #[error("停机时间重叠: 与事件 {conflicting_event_id} [{conflicting_start}, {conflicting_end}) 冲突")]
    DowntimeOverlap {
        conflicting_event_id: String,
        conflicting_start: String,
        conflicting_end: String,
    },

    #[error("停机事件不存在: {0}")]
    EventNotFound(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("存储失败: {0}")]
    StorageFailure(String),
}

impl ApiError {
    /// 稳定错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            ApiError::MissingSelector(_) => "MISSING_SELECTOR",
            ApiError::RunNotFound(_) => "RUN_NOT_FOUND",
            ApiError::CatalogEntryNotFound(_) => "CATALOG_ENTRY_NOT_FOUND",
            ApiError::DowntimeOverlap { .. } => "DOWNTIME_OVERLAP",
            ApiError::EventNotFound(_) => "EVENT_NOT_FOUND",
            ApiError::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// 错误响应体
    pub fn to_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
        }
    }
}

/// 供传输层序列化的错误体
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorResponse {
    pub code: &'static str,
    pub message: String,
}

// ==========================================
// 从 DowntimeError 转换
// ==========================================
impl From<DowntimeError> for ApiError {
    fn from(err: DowntimeError) -> Self {
        match err {
            DowntimeError::InvalidTimestamp { input } => ApiError::InvalidTimestamp(input),
            DowntimeError::InvalidDuration { duration_min } => {
                ApiError::InvalidInput(format!("停机时长必须为正数: {} 分钟", duration_min))
            }
            DowntimeError::MissingSelector { field } => ApiError::MissingSelector(field.to_string()),
            DowntimeError::RunNotFound { context } => ApiError::RunNotFound(context),
            DowntimeError::CatalogEntryNotFound { context } => ApiError::CatalogEntryNotFound(context),
            DowntimeError::DowntimeOverlap {
                conflicting_event_id,
                conflicting_start,
                conflicting_end,
            } => ApiError::DowntimeOverlap {
                conflicting_event_id,
                conflicting_start,
                conflicting_end,
            },
            DowntimeError::EventNotFound { event_id } => ApiError::EventNotFound(event_id),
            DowntimeError::StorageFailure(repo_err) => ApiError::from(repo_err),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } if entity == "DowntimeEvent" => {
                ApiError::EventNotFound(id)
            }
            other => ApiError::StorageFailure(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
