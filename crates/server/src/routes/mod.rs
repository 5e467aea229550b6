pub mod chat;
pub mod contexts;
pub mod public_contexts;
