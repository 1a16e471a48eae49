pub mod chat;
pub mod events;
pub mod ratio;
pub mod session;
