//! Availability resolution and booking admission for a table-booking
//! platform: weekly bit-mask templates, date-keyed occasion overrides,
//! slot legality checks, and capacity-bounded admission persisted through
//! a group-commit WAL.

pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
pub mod wire;
