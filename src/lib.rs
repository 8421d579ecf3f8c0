pub mod client;
pub mod common;

pub use client::{Session, SubmitOutcome, TransformClient};
pub use common::messages::{Operation, SelectedFile, SubmitInput};
