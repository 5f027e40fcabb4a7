//! 实时协作核心的领域模型
//!
//! 包含房间、消息、通话等实体，slug 规则，以及双向事件协议。

pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
