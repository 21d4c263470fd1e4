//! Message Finder: watches a live feed, picks eligible items and acts on
//! them one at a time, with cooldowns, sampling and remote control.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod executor;
pub mod feed;
pub mod logging;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;
