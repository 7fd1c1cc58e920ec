//! System utilities and monitoring

pub mod metrics;
