pub mod error;
pub mod handlers;
pub mod keys;
pub mod preview;
pub mod repository;
pub mod service;
pub mod slots;
#[cfg(test)]
pub mod testing;
pub mod validation;

pub use error::ResumeError;
pub use service::ResumeService;
