//! CareLink authentication core: the `/api/auth` HTTP service backed by
//! Postgres, and a client SDK (`client`) that manages the durable
//! session snapshot on the caller's side.

pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
