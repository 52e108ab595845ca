//! Service launch: the immutable launch spec, subprocess spawning, and
//! keep-alive supervision.

mod spec;
mod supervise;

pub use spec::ServiceLaunchSpec;
pub use supervise::{KeepAlive, ServiceHandle, await_ready, spawn_service};
