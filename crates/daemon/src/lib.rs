#![forbid(unsafe_code)]

//! Visits tracker daemon: durable task store, provider client, pollers and
//! the HTTP API.

pub mod config;
pub mod http;
pub mod registry;
pub mod remote;
pub mod service;
pub mod store;
mod worker;
