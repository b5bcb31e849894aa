//! Huddle API Library Crate
//!
//! Runs two voice personas in a video meeting: webhook intake from the
//! meeting-bot platform, bot provisioning, the persona sessions and the UI
//! broadcast socket. The `api` binary is a thin wrapper around this library.

pub mod companion;
pub mod config;
pub mod handlers;
pub mod meeting;
pub mod models;
pub mod persona;
pub mod recall;
pub mod router;
pub mod state;
pub mod ws;
