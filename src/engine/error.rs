// ==========================================
// 产线停机核心 - 引擎层错误类型
// ==========================================
// 所有解析失败都在写入前检出，整笔事务回滚
// 本层不做重试，StorageFailure 原样上抛
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DowntimeError {
    #[error("无法解析的时间: {input}")]
    InvalidTimestamp { input: String },

    #[error("停机时长非法: {duration_min} 分钟（必须为正数）")]
    InvalidDuration { duration_min: i64 },

    #[error("缺少定位字段: {field}")]
    MissingSelector { field: &'static str },

    #[error("未找到生产批次: {context}")]
    RunNotFound { context: String },

    #[error("未找到停机原因主数据: {context}")]
    CatalogEntryNotFound { context: String },

    #[error("停机时间重叠: 与事件 {conflicting_event_id} [{conflicting_start}, {conflicting_end}) 冲突")]
    DowntimeOverlap {
        conflicting_event_id: String,
        conflicting_start: String,
        conflicting_end: String,
    },

    #[error("停机事件不存在: event_id={event_id}")]
    EventNotFound { event_id: String },

    #[error("存储失败: {0}")]
    StorageFailure(#[from] RepositoryError),
}

impl From<rusqlite::Error> for DowntimeError {
    fn from(err: rusqlite::Error) -> Self {
        DowntimeError::StorageFailure(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type DowntimeResult<T> = Result<T, DowntimeError>;
