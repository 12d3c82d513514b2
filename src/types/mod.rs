mod enums;
mod models;

pub use enums::{EntityType, NotificationKind, Role, TaskPriority, TaskStatus};
pub use models::*;
