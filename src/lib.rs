//! Library crate for trivia-host-back, exposing the match engine to the binary and to tests.

pub mod config;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
