//! Segment stream request handling
//!
//! Requests follow the URL convention `/{application}/{stream}/{file}.{ext}`.
//! The extension decides whether a request is for a playlist, a media
//! segment or something stream-level the publisher may still answer.
//!
//! # Architecture
//!
//! ```text
//!   HttpTransport
//!        │ on_http_data (never awaits)
//!        ▼
//!   SegmentStreamInterceptor ──► parse_request_url ──► SegmentWorkItem
//!        │                                                  │
//!        │ /crossdomain.xml, OPTIONS                        │ hash(app/stream) % N
//!        ▼ answered inline                                  ▼
//!   CrossDomainPolicy                          SegmentWorkerManager (N workers)
//!                                                           │
//!                                                           ▼
//!                                   SegmentStreamServer::process_request
//!                                                           │
//!                                                           ▼
//!                                                SegmentStreamHandler
//! ```
//!
//! # Ordering
//!
//! Every request for the same stream key lands on the same worker queue, so
//! requests for one stream are processed in arrival order. Different
//! streams proceed in parallel.

pub mod context;
pub mod cors;
pub mod interceptor;
pub mod observer;
pub mod request;
pub mod server;
pub mod worker;

pub use context::SegmentStreamContext;
pub use cors::{url_exist_check, CrossDomainPolicy};
pub use interceptor::{InterceptorKind, SegmentStreamInterceptor};
pub use observer::{ObserverError, ObserverRegistry, SegmentStreamObserver};
pub use request::{
    parse_request_url, PlayListType, RequestParseError, SegmentRequestKind,
    SegmentStreamRequestInfo, SegmentType, StreamKey,
};
pub use server::{PublisherType, SegmentStreamHandler, SegmentStreamServer};
pub use worker::{SegmentProcessHandler, SegmentWorkItem, SegmentWorkerManager, SubmitError};
