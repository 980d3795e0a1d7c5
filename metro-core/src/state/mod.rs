pub mod connection;
pub mod session;

pub use connection::ConnectionPhase;
pub use session::{Session, SessionPhase, Token};
