//! HTTP datastructures
//!
//! This module provides:
//! - Request methods as composable bit flags
//! - The status code table with reason phrases
//! - Request and response views over hyper types
//! - The per-request connection handle and interceptor trait

pub mod connection;
pub mod interceptor;
pub mod method;
pub mod request;
pub mod response;
pub mod status;
pub mod types;

pub use connection::{HttpConnection, PendingResponse, ResponseEnvelope};
pub use interceptor::{DefaultInterceptor, HttpInterceptor, HttpRequestHandler, PathPattern};
pub use method::HttpMethod;
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use status::HttpStatusCode;
pub use types::{HttpConnectionPolicy, HttpInterceptorResult, HttpNextHandler, RequestPhase};
