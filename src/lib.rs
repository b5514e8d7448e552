//! Creel - a personal RSS feed aggregator
//!
//! Users register, follow feeds, and run `creel agg <interval>` to poll
//! followed feeds on a fixed cadence, deduplicating items by link before
//! storing them as posts for later browsing.

pub mod agg;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
