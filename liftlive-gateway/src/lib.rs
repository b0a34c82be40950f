//! Live set event gateway for LiftLive clients
//!
//! This crate hosts the real-time hub that connected training clients share.
//! It tracks the one active set, buffers its reps, and pushes set lifecycle
//! and coaching events to every session over WebSocket.
//!
//! # Features
//!
//! - WebSocket endpoint (`/ws`) served with axum
//! - `{"event": ..., "data": ...}` JSON text frames
//! - Gateway-global set state (idle / active) with an idle watchdog
//! - New client catch-up (acknowledgment + live snapshot during a set)
//! - In-process lifecycle notifications for hooks (history, rest cues)
//!
//! # Event Types
//!
//! Server → client:
//! - `rep` - One completed rep
//! - `setUpdate` - Live snapshot of the active set
//! - `setEnd` - Final summary and coaching tip
//! - `musicCue` - Duck or restore music volume
//! - `shorts` - Rest-period video queue
//! - `connection_ack` - Sent once per new session
//! - `processing_error` - Reply to a malformed client frame
//!
//! Client → server:
//! - `startSet` - Begin a set (optional context)
//! - `endSet` - End the set (optional rep list)
//! - `rep` - Push a rep from an ingestion client
//!
//! # Example Usage
//!
//! ```no_run
//! use liftlive_gateway::{GatewayConfig, GatewayServer, LiveGateway};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Arc::new(LiveGateway::new(GatewayConfig::default()));
//!     let _watchdog = gateway.spawn_watchdog();
//!
//!     let server = GatewayServer::new(Arc::clone(&gateway));
//!     let addr = server.start("127.0.0.1:3001".parse()?).await?;
//!     println!("listening on ws://{}/ws", addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod gateway;
pub mod server;

// Re-exports
pub use client::{ClientManager, SessionId};
pub use error::{GatewayError, Result};
pub use events::{ClientCommand, GatewayEvent, ServerEvent};
pub use gateway::{GatewayConfig, LiveGateway};
pub use server::{router, GatewayServer};
