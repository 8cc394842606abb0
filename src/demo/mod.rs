//! Record-store demo surface: the storefront routes and background tasks,
//! reduced to what exercises the telemetry core.

pub mod routes;
pub mod tasks;
