mod connection_state;
mod hardware_link;
mod link_kind;

pub use connection_state::ConnectionState;
pub use hardware_link::{HardwareLink, ReadBatch};
pub use link_kind::LinkKind;
