//! Client-side sync layer for a media player control backend.
//!
//! Players, their metadata and play state are pulled through a small query
//! cache and pushed over server-sent event streams. One connection per stream
//! URL is shared by every subscriber ([`multiplexer`]); results land in a
//! reducer-driven store ([`store`]) from which the current player is derived
//! ([`selector`]). [`remote::MediaRemote`] wires it all together for a UI loop.

pub mod api;
pub mod commands;
pub mod config;
mod exec;
pub mod logging;
pub mod multiplexer;
pub mod now_playing;
pub mod position;
pub mod query;
pub mod remote;
pub mod seek_slider;
pub mod selector;
pub mod session;
pub mod sse;
pub mod store;
pub mod sync;
pub mod time_format;
pub mod transport;
pub mod volume;

pub use media_remote_types as types;
