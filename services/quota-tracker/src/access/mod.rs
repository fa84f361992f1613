pub mod command;
pub mod controller;
pub mod registry;

pub use command::{Command, CommandError};
pub use controller::{quota_error_reply, AccessController, Authorization};
pub use registry::{AccessEntry, AccessRegistry};
