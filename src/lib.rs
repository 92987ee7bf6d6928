pub mod antagonist;
pub mod config;
pub mod constants;
pub mod directory;
pub mod engine;
pub mod error;
pub mod rng;
pub mod ruleset;
pub mod schedule;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
pub mod world;
