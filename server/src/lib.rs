//! Anchorvault server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod cipher;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod ledger;
pub mod metadata;
pub mod objects;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod state;
