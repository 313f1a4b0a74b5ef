//! Infrastructure layer: network listeners, per-connection sessions, and the
//! default store/notifier adapters.

pub mod http_api;
pub mod log_notifier;
pub mod memory_store;
pub mod session;
pub mod ws_server;

pub use http_api::{run_http_server, ApiState};
pub use log_notifier::LogNotifier;
pub use memory_store::MemoryStore;
pub use ws_server::run_ws_server;
