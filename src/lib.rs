pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod output;
pub mod random;
pub mod replication;
pub mod stage;
pub mod state;
pub mod stats;
