//! Catalog matching library - shared modules for all binaries.

pub mod catalog;
pub mod error;
pub mod hash;
pub mod library;
pub mod matcher;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod safety;
pub mod scoring;
pub mod store;
pub mod tags;
