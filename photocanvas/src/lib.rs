//! PhotoCanvas storage core
//!
//! This library exposes image processing, the image cache, gallery storage
//! and the legacy migration for the command-line front end and for tests.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;
