// ABOUTME: Command module aggregator for the reimage CLI.
// ABOUTME: Re-exports the upgrade command handler.

mod runtime_connection;
mod upgrade;

pub use upgrade::upgrade;
