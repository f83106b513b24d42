pub mod api;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod global;
pub mod media;
pub mod occupancy;
pub mod reconcile;
pub mod registry;
pub mod rtc;
