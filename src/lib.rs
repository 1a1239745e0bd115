//! Nominatim CLI Library
//!
//! A client for the OpenStreetMap Nominatim geocoding API with response
//! caching, client-side rate limiting and retries. The `nominatim` binary is
//! a thin front end over [`api::NominatimClient`].

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod params;
pub mod rate_limit;
pub mod retry;
pub mod transport;
