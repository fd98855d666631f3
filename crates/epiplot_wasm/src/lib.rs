//! Browser bindings for the epiplot dashboard core.
//!
//! The host page owns the network: it fetches feed URLs handed out by
//! [`WasmDashboard`] and passes the bodies back through `provide_response`.

mod dashboard;
mod transport;

pub use dashboard::WasmDashboard;
