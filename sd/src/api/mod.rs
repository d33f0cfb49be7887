//! API contracts
//!
//! Typed request/response schemas for every published operation and the
//! service facade that implements them over the core components. The HTTP
//! router binds routes to these operations at the edge.

mod service;
mod types;

pub use service::{
    AnalyzeCodeRequest, AnalyzeCodeResponse, ApiService, CreateStandardRequest, HealthResponse,
    ListStandardsQuery, ListStandardsResponse, RecommendationsRequest, RecommendationsResponse,
    SearchMetadata, SearchResult, SearchStandardsRequest, SearchStandardsResponse, StartWorkflowRequest,
    StartWorkflowResponse, ViolationReport,
};
pub use types::{ApiError, ApiRequest, ApiResponse, AuthMethod, AuthUser};
