pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod poller;
pub mod routes;
pub mod scoring;
pub mod sync;
pub mod timer;
pub mod types;
