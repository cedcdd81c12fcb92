//! Access to the external telemetry provider.
//!
//! - [`UpstreamGateway`]: the seam the executor and warming scheduler use.
//! - [`HttpGateway`]: REST client for the provider.
//! - [`CachingGateway`]: serves schedules and session metadata from the
//!   result cache before asking upstream.
//! - [`fixture::StaticGateway`]: scripted in-memory gateway for tests and
//!   local runs.

pub mod caching;
pub mod fixture;
pub mod gateway;
pub mod http;

pub use caching::CachingGateway;
pub use gateway::{UpstreamError, UpstreamGateway};
pub use http::HttpGateway;
