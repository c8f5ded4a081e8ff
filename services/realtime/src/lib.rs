//! services/realtime/src/lib.rs
//!
//! The realtime gateway service: WebSocket chat and call signaling plus the
//! REST catch-up endpoints, wired over the coordinators in `mentorhub_core`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
