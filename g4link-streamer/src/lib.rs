//! # g4link-streamer — panel streaming front end
//!
//! Loads a TOML configuration, builds a capture backend and a transport,
//! and runs one of the `stream`, `once`, `probe` or `show` commands.
//!
//! ## Transports
//!
//! - **websocket**: binary chunks to `ws://host:81/`, one connection per frame.
//! - **chunk-push**: one `POST /stream-chunk` per chunk.
//! - **upload-apply**: whole-frame `POST /upload` followed by `POST /apply`.

pub mod config;
pub mod service;
