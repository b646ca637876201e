mod active_connection;
mod broadcast_command;
mod broadcast_controller;
mod broadcaster;

pub use active_connection::ActiveConnection;
pub use broadcast_command::BroadcastCommand;
pub use broadcaster::{BroadcastState, Broadcaster};
