//! # Custom resource definition module
//!
//! This module provide custom resource definition managed or read by the
//! operator, their structures and implementation.

pub mod database;
pub mod rest_data_service;
