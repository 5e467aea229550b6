pub mod chat;
pub mod chat_context;
pub mod context;
pub mod context_star;
pub mod message;
pub mod public_context;
pub mod stream_id;
pub mod user;
