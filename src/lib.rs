//! Image-to-3D Generation Backend
//!
//! This library provides the core functionality for the meshgen system:
//! an asynchronous job pipeline that turns a single uploaded image into a
//! downloadable textured 3D asset, with durable progress tracking and
//! S3-compatible artifact storage.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod store;
pub mod worker;
