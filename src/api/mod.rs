// ==========================================
// 产线停机核心 - API 层
// ==========================================
// 职责: 输入校验、错误码映射，供外部传输层调用
// ==========================================

pub mod downtime_api;
pub mod error;

pub use downtime_api::{
    DowntimeApi, DowntimeEventView, ResolveCatalogRequest, ResolveRunRequest, ResolvedCatalogView,
};
pub use error::{ApiError, ApiErrorResponse, ApiResult};
