//! Interactive environment manager

pub mod console;
pub mod controller;
pub mod menu;
pub mod operations;

pub use console::Console;
pub use controller::{Connector, Manager, NetworkConnector};
pub use menu::{Command, EnvironmentChoice};
pub use operations::{confirm, DELETE_TOKEN};
