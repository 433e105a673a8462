//! WorkSLA reporting middleware.
//!
//! Mirrors a bounded window of work items from an upstream tracker into a
//! local relational cache and serves filtered, allowlist-scoped listing and
//! SLA reporting views over it. The upstream tracker is only ever read.

pub mod allowlist;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod repo;
pub mod routes;
pub mod state;
pub mod sync;
pub mod upstream;
