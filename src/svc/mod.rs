//! # Services module
//!
//! This module provide services to interact with kubernetes, the oracle rest
//! data service reconciler and helpers to do so.
pub mod cfg;
pub mod crd;
pub mod k8s;
pub mod ords;
pub mod retry;
pub mod telemetry;
