pub mod domain_event;
pub mod protocol;

pub use domain_event::ChatEvent;
pub use protocol::*;
