//! Boundary value objects shared by every component.
//!
//! - [`DataType`] / [`RequestPriority`] - request classification
//! - [`FetchParams`] / [`FetchResult`] - provider call contract
//! - [`DataRequest`] / [`DataResponse`] - gateway contract
//! - [`BatchDataRequest`] / [`BatchDataResponse`] - batch gateway contract

mod fetch;
mod request;
mod response;
mod types;

pub use fetch::{
    FetchParams, FetchResult, META_ATTEMPTS, META_FALLBACK_USED, META_LATENCY_MS, UNKNOWN_ERROR,
};
pub use request::{BatchDataRequest, DataRequest, DEFAULT_REQUEST_TIMEOUT};
pub use response::{
    BatchDataResponse, DataResponse, ResponseStatus, GATEWAY_SOURCE, META_CIRCUIT_BREAKER_OPEN,
};
pub use types::{DataType, RequestPriority};
