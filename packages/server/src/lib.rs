//! Chat and presence hub library for a self-hosted live-streaming server.
//!
//! Viewers connect over WebSocket, exchange chat messages through a single
//! hub, and are tracked for presence and peak viewer statistics. Moderators
//! hide or show messages and inspect the roster over HTTP.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// wiring
pub mod app;
