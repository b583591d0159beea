use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "songfetch",
    about = "Resolve songs to playable audio assets via video search, an external downloader, and ffmpeg",
    version,
    long_about = "Searches a video metadata provider for recordings of a song, picks the candidate \
closest to the requested duration, downloads its audio with an external downloader, normalizes it \
to the configured format, and stores the result in the configured storage backend."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a song and store its audio in the configured backend
    Acquire {
        /// Stable song identifier; the stored key becomes <id>.<format>
        #[arg(long)]
        id: String,

        /// Artist name used in the search queries
        #[arg(long)]
        artist: String,

        /// Song title used in the search queries
        #[arg(long)]
        title: String,

        /// Target duration in milliseconds; candidates are ranked by proximity
        #[arg(long)]
        duration_ms: i64,

        /// Search API key (overrides the configured one)
        #[arg(long, env = "YOUTUBE_API_KEY")]
        api_key: Option<String>,

        /// Requesting user recorded in log lines
        #[arg(long)]
        user: Option<String>,
    },

    /// Resolve the chosen candidate's source URL without downloading
    Locate {
        /// Song identifier used in log lines
        #[arg(long, default_value = "adhoc")]
        id: String,

        /// Artist name used in the search queries
        #[arg(long)]
        artist: String,

        /// Song title used in the search queries
        #[arg(long)]
        title: String,

        /// Target duration in milliseconds
        #[arg(long)]
        duration_ms: i64,

        /// Search API key (overrides the configured one)
        #[arg(long, env = "YOUTUBE_API_KEY")]
        api_key: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check availability of the external downloader and converter
    Doctor,
}
