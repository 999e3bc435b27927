//! Losia Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.
//!
//! - [`backend`] - collaborator traits with HTTP and in-memory implementations
//! - [`services`] - cart, voucher, checkout, notification and eco-impact logic
//! - [`routes`] - the JSON API
//! - [`state`] - shared application state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
