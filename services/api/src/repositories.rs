//! Repositories for database operations

pub mod chat;
pub mod counters;

pub use chat::ChatRepository;
pub use counters::CounterRepository;
