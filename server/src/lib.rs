//! GateHub Server - Access-control event ingestion hub.
//!
//! This crate provides the server component of GateHub, responsible for:
//! - Receiving push notifications from access-control devices
//! - Normalizing vendor payloads into canonical events
//! - Persisting events and heartbeats to storage
//! - Broadcasting event summaries to connected observers
//!
//! # Architecture
//!
//! The server sits between devices (event producers) and observers (event
//! consumers). Each notification flows through a fixed pipeline: payload
//! extraction, normalization, attachment saving, persistence, then a
//! best-effort broadcast of a one-line summary.

pub mod attachments;
pub mod broadcast;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod storage;
pub mod types;
