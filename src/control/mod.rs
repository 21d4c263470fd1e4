//! Command channel: JSON commands in, engine events out.

pub mod command;
pub mod ws;

pub use command::Command;
pub use ws::control_routes;
