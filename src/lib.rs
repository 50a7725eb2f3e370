//! Connection core for sensorlink.
//!
//! Discovers one peripheral advertising a known service, connects to
//! it, reads one characteristic at a fixed interval and recovers the
//! link on its own when anything fails.
//!
//! Everything here is pure logic over two capabilities, a
//! [`radio::Radio`] and a [`clock::Clock`], so it runs on the host
//! as well as on target.
//!
//! Usage: `cargo test --lib` for unit tests, `cargo test` for the
//! scenarios in `tests/` too.
//!
//! Note: The embedded binary (`main.rs`, feature `embedded`) supplies
//! the SoftDevice radio and runs [`client::SensorClient`] in its
//! superloop.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod link;
pub mod output;
pub mod poll;
pub mod radio;
pub mod read;

#[cfg(test)]
mod mock;

pub use client::SensorClient;
pub use error::Error;
