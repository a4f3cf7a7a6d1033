//! Campus portal client: session management, role-based access control and
//! the role-driven dashboard aggregation.
pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod guard;
pub mod models;
pub mod report;
pub mod roles;
pub mod session;
pub mod storage;
