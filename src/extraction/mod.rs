pub mod consensus;
pub mod parse;
pub mod refine;
pub mod strategy;
pub mod types;
pub mod verify;

pub use types::*;
