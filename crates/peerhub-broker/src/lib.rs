//! peerhub-broker library crate.
//!
//! The broker is the control plane for devices that belong to the same
//! account: it verifies identity claims at connect time, tracks which peers
//! are currently online, and relays small control frames between them so
//! they can establish a direct data channel elsewhere. It is a presence and
//! signaling plane, not a durable message queue.
//!
//! # Architecture
//!
//! ```text
//! Client (JSON over WebSocket)          Operator / apps (HTTP JSON)
//!         ↕                                      ↕
//! [peerhub-broker]
//!   ├── domain/            BrokerConfig and its TOML file schema
//!   ├── application/
//!   │     ├── hub/         Single-loop registry + router actor
//!   │     ├── handshake/   Claim resolution against the identity store
//!   │     └── directory/   Claim/list/verify facade over store + notifier
//!   └── infrastructure/
//!         ├── ws_server/   Session accept loop (tokio-tungstenite)
//!         ├── session/     Per-connection read loop + write task
//!         ├── http_api/    axum facade routes
//!         ├── memory_store/ In-memory IdentityStore adapter
//!         └── log_notifier/ tracing-backed VerificationNotifier
//! ```
//!
//! # Layer rules
//!
//! - `domain` holds plain configuration types (no I/O beyond file loading).
//! - `application` depends on `domain` and `peerhub-core` contracts only;
//!   everything concrete is injected.
//! - `infrastructure` depends on the other layers plus tokio, tungstenite,
//!   and axum.

/// Domain layer: broker configuration.
pub mod domain;

/// Application layer: hub actor, handshake resolution, verification facade.
pub mod application;

/// Infrastructure layer: listeners, sessions, and default adapters.
pub mod infrastructure;
