// ==========================================
// 产线停机核心 - 引擎层
// ==========================================
// 职责: 时间归一化、批次解析、主数据解析、冲突检测、写入编排
// 红线: Engine 不拼 SQL，所有拒绝必须带原因
// ==========================================

pub mod catalog_resolver;
pub mod conflict_detector;
pub mod error;
pub mod event_writer;
pub mod run_resolver;
pub mod time_normalizer;

// 重导出核心引擎
pub use catalog_resolver::{
    CatalogMatchStep, CatalogQuery, CatalogResolver, CatalogSelector, DetailRule, LookupStep,
    ResolvedCatalogEntry, TypeSelector,
};
pub use conflict_detector::{CandidateInterval, ConflictDetector};
pub use error::{DowntimeError, DowntimeResult};
pub use event_writer::DowntimeEventWriter;
pub use run_resolver::{ResolvedRun, RunQuery, RunResolver};
pub use time_normalizer::{NormalizedTime, TimeNormalizer, TimeSource};
