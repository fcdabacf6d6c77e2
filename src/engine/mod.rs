pub mod config;
pub mod duel;
pub mod moves;
pub mod resolve;
pub mod server;
pub mod settlement;
