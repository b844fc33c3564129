//! Adapters for the domain ports: reqwest-backed HTTP clients for the remote
//! loans API and scripted in-memory implementations.

pub mod http;
pub mod in_memory;
