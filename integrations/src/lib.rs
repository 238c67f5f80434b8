//! Monitoring integrations built on `integration_sdk`. Each module acquires
//! raw data from one service and maps it through its definition tables; the
//! `nr-*` binaries wrap them in a single collect-and-publish run.

pub mod apache;
pub mod cassandra;
pub mod common;
pub mod mysql;
pub mod nginx;
