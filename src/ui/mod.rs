//! Terminal user interface

pub mod app;
pub mod conversation;
pub mod login;

pub use app::App;
