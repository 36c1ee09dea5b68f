//! Shared models

pub mod user;

pub use user::{Location, NewUser, Role, UpdateProfile, User};
