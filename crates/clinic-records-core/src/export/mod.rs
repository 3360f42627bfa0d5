//! Patient history export.

mod history;

pub use history::*;
