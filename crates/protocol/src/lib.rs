//! Wire types and constants shared by the Nimbus upload pipeline.
//!
//! The drive backend exposes two multipart endpoints: one receiving a single
//! gzip-compressed chunk, one assembling the chunks into a stored file.

pub mod constants;
pub mod types;

pub use types::{ErrorBody, FileRecord};
