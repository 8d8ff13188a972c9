#![forbid(unsafe_code)]

//! Building blocks for the tubepipe wrapper API.
//!
//! The service itself is glue: it shells out to yt-dlp, reshapes the tool's
//! JSON report, and relays raw download bytes. The library exists so the
//! handlers, the projection logic, and the subprocess plumbing can be
//! exercised separately from a running server.

pub mod config;
pub mod formats;
pub mod server;
pub mod ytdlp;
