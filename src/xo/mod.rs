pub mod backup;
pub mod client;
pub mod error;
pub mod vm;

pub use client::{ListQuery, XoClient};
pub use error::XoError;
