mod audit;
mod auth;
pub mod dto;
mod groups;
mod notifications;
pub mod response;
mod router;
mod tasks;
mod users;
pub mod validation;

pub use router::{AppState, PasswordReset, create_router};
