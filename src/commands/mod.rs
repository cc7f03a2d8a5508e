// ABOUTME: Command implementations for each CLI subcommand
// ABOUTME: Exports run, status, create, and checksum commands

pub mod checksum;
pub mod create;
pub mod run;
pub mod status;

pub use checksum::checksum;
pub use create::create;
pub use run::run;
pub use status::status;
