//! CLI command handlers
//!
//! Every handler prints its structured result as pretty JSON on stdout and
//! returns whether the result is valid; notices go to stderr.

pub mod chapters;
pub mod checkpoint;
pub mod decisions;
pub mod init;
pub mod recover;
pub mod report;
pub mod status;
pub mod validate;

use crate::Result;
use serde::Serialize;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
