pub mod api;
pub mod config;
pub mod economy;
pub mod engine;
pub mod matchmaking;
pub mod metrics;
pub mod players;
pub mod rating;
pub mod replay;
