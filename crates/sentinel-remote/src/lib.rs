//! sentinel-remote — reqwest adapters for the processing backend.

pub mod http;

pub use http::RemoteServices;
