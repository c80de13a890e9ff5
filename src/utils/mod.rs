//! Helper utilities, functions, and macros.

#[macro_use]
pub mod print;

#[macro_use]
mod config;

mod error;

pub use error::RingKvError;
