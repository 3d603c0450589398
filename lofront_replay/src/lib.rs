// lofront_replay/src/lib.rs

// Offline log replay for the frontend: CLI, config loading, session format
// and the replay loop.
pub mod cli;
pub mod config;
pub mod replay;
pub mod session;
