//! Per-task push channel.
//!
//! A client connects to `/api/v1/tasks/{id}/ws`, receives the current
//! record, then every published update until the task reaches a terminal
//! state. Open connections are tracked by [`WsManager`] so the heartbeat
//! and shutdown can reach them.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::task_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
