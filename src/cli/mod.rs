//! The CLI's uniform glue over the store and MMR core (spec §1; out of core scope,
//! but shipped per SPEC_FULL §4.11).
mod command;
mod runner;
mod util;

pub use command::Command;
pub use runner::{OutputMode, run_with_format};
pub use util::parse_hex;
