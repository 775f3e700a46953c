//! Usergate - session authentication for user profiles
//!
//! This library provides the user service (registration, login, session
//! gate, profiles) and the forwarding proxy that fronts it.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod proxy;
pub mod services;
pub mod shutdown;
