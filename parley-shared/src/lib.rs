#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, allow(unsafe_code))]
#![warn(clippy::pedantic)]

//! Wire models and configuration shared by the Parley server and its clients.

pub mod config;
pub mod models;
