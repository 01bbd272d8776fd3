//! Host-side relay core: the concurrency gate (C4), peer session (C5),
//! streaming relay orchestrator (C6), and connection supervisor (C8).
//!
//! `bridge-protocol` and `bridge-provider` sit below this crate; the
//! binaries in `apps/` sit above it and own the transport and CLI.

pub mod debug_log;
pub mod gate;
pub mod orchestrator;
pub mod session;
pub mod supervisor;

pub use debug_log::{new_debug_logger, DebugLine, DebugLogger};
pub use gate::Gate;
pub use orchestrator::{Relay, RelayStatus};
pub use session::SessionId;
pub use supervisor::{ConnectionSupervisor, MAX_PEERS};
