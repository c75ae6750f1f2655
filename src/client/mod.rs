//! Client connection layer

pub mod control_plane;
#[cfg(test)]
pub mod mock;
pub mod raw_connection;
pub mod session;

pub use control_plane::{ControlPlane, ControlPlaneExt};
pub use raw_connection::{ConnectionFactory, Deadline, RawConnection};
pub use session::{KeyScan, ServerInfo, Session, SCAN_COUNT};
