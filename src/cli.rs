//! Command-line interface for myaei
//!
//! Provides argument parsing and subcommand handling for the myaei binary.

use clap::{Parser, Subcommand};

/// Emotional-intelligence analysis service
#[derive(Parser)]
#[command(name = "myaei")]
#[command(version)]
#[command(about = "Emotional-intelligence analysis service backed by a hosted LLM")]
#[command(
    long_about = "myaei analyses messages for emotional red flags, sentiment and \
    communication patterns using an OpenAI-compatible LLM provider, and keeps a \
    history of analyses per relationship."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# myaei Configuration
# ====================
#
# This file configures the HTTP server, the LLM provider, the analysis
# pipeline, storage, and observability settings for myaei.
#
# Secrets belong in the environment (or a .env file), not here:
#   GROQ_API_KEY        provider credential (required for analyses)
#   MONGO_URL, DB_NAME  MongoDB connection (storage.backend = "mongodb")
#   MYAEI_MODEL         model override
#   MYAEI_MAX_RETRIES   retry override

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 8001

# ─────────────────────────────────────────────────────────────────────────────
# LLM PROVIDER
# ─────────────────────────────────────────────────────────────────────────────
#
# Any OpenAI-compatible endpoint; requests go to {base_url}/chat/completions.

[llm]
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.1-8b-instant"

# Sampling (temperature 0.0-2.0, top_p in (0.0, 1.0])
temperature = 0.3
max_tokens = 1500
top_p = 1.0

# Total provider attempts per analysis (1-10)
max_retries = 3

# Base backoff in milliseconds. Connection and 5xx errors wait
# base * 2^(attempt-1); unparseable replies and unexpected errors wait base.
retry_backoff_ms = 1000

# Transport timeout for a single provider call (1-300)
request_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# ANALYSIS
# ─────────────────────────────────────────────────────────────────────────────

[analysis]
# Reply schema requested from the model:
#   - "standard": sentiment, interpretation
#   - "enhanced": standard plus emotional_tone, communication_style
schema = "enhanced"

# When every provider attempt fails:
#   - "fallback": return a neutral "analysis unavailable" result (HTTP 200)
#   - "fail": return 503 (provider unavailable) or 500 (unexpected failure)
# Unparseable replies always fall back.
on_exhaustion = "fallback"

# ─────────────────────────────────────────────────────────────────────────────
# STORAGE
# ─────────────────────────────────────────────────────────────────────────────

[storage]
# "memory" (default, lost on restart) or "mongodb" (requires the mongodb feature)
backend = "memory"
url = "mongodb://localhost:27017"
database = "myaei"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG takes precedence)
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
