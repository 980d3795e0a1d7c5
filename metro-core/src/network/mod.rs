pub mod connection;
pub mod transport;

pub use connection::{Connection, ConnectionInfo};
pub use transport::FrameTransport;
