pub mod auth;
pub mod authz;
pub mod chat_turn;
pub mod context_generator;
pub mod context_merge;
pub mod library;
pub mod search;
pub mod stream_registry;
