//! Songfetch - resolve a song (artist, title, target duration) to a playable audio asset
//!
//! This library searches a video metadata provider for candidate recordings, picks the one
//! closest to the requested duration, fetches its audio through an external downloader,
//! normalizes it with an external converter, and hands the result to a storage gateway.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod convert;
pub mod process;
pub mod search;
pub mod storage;
pub mod utils;

pub use acquire::{AcquireFailure, AcquisitionPipeline, ClientContext, SongRequest, StoredAsset};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use search::{Candidate, SearchClient};
pub use storage::{BlobHandle, StorageGateway, StorageScope};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
