//! Application layer: the hub actor, handshake resolution, and the
//! verification facade. Everything here depends only on the `peerhub-core`
//! contracts and domain configuration; sockets and storage backends are
//! injected by the infrastructure layer.

pub mod directory;
pub mod handshake;
pub mod hub;
