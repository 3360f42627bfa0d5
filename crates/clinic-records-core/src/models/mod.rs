//! Domain models for the clinic records system.

mod practitioner;
mod record;

pub use practitioner::*;
pub use record::*;
