//! 领域实体

pub mod call;
pub mod identity;
pub mod message;
pub mod room;

pub use call::*;
pub use identity::*;
pub use message::*;
pub use room::*;
