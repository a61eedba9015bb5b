use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::counter::TokenCounter;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub summarize: SummarizeConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DISTILL_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DISTILL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            summarize: SummarizeConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:    data_dir={}", self.storage.data_dir.display());
        tracing::info!("  llm:        provider={}", self.llm.provider);
        tracing::info!("  ollama:     url={}", self.ollama.url);
        tracing::info!(
            "  summarize:  chunk_size={}, overlap={}, token_max={}, unit={}",
            self.summarize.chunk_size,
            self.summarize.chunk_overlap,
            self.summarize.token_max,
            self.summarize.tokenizer.label(),
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": { "data_dir": self.storage.data_dir },
            "llm": {
                "provider": self.llm.provider,
                "configured": self.llm.is_configured(),
                "temperature": self.llm.temperature,
                "max_tokens": self.llm.max_tokens,
                "request_timeout_secs": self.llm.request_timeout_secs,
            },
            "ollama": { "url": self.ollama.url, "model": self.ollama.model },
            "summarize": {
                "chunk_size": self.summarize.chunk_size,
                "chunk_overlap": self.summarize.chunk_overlap,
                "token_max": self.summarize.token_max,
                "concurrency": self.summarize.concurrency,
                "max_retries": self.summarize.max_retries,
                "tokenizer": self.summarize.tokenizer.label(),
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Maximum upload size in megabytes.
    pub max_upload_mb: u32,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
            max_upload_mb: profiled_env_u32(p, "MAX_UPLOAD_MB", 64),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persisted uploads.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }

    /// Directory where uploaded files are persisted before extraction.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

// ── LLM (OpenAI / Anthropic / Ollama) ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Independent timeout applied to every completion call.
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "openai"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-3.5-turbo-16k"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.0")
                .parse()
                .unwrap_or(0.0),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
            request_timeout_secs: profiled_env_u64(p, "LLM_TIMEOUT_SECS", 120),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
        }
    }
}

// ── Summarize pipeline ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    /// Maximum chunk size, in the configured counting unit.
    pub chunk_size: usize,
    /// Trailing units of a chunk repeated at the start of the next.
    pub chunk_overlap: usize,
    /// Maximum text size passed to one reduce-stage completion call.
    pub token_max: usize,
    /// Concurrent completion calls in flight.
    pub concurrency: usize,
    /// Retries per completion call after the first attempt (0 = no retry).
    pub max_retries: u32,
    /// Base backoff between retries, in milliseconds (doubles per attempt).
    pub retry_backoff_ms: u64,
    /// Counting unit for chunk sizes and the token budget.
    pub tokenizer: TokenCounter,
    /// Optional template file overriding the built-in map prompt.
    pub map_prompt_path: Option<String>,
    /// Optional template file overriding the built-in reduce prompt.
    pub reduce_prompt_path: Option<String>,
}

impl SummarizeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            chunk_size: profiled_env_usize(p, "CHUNK_SIZE", 12000),
            chunk_overlap: profiled_env_usize(p, "CHUNK_OVERLAP", 0),
            token_max: profiled_env_usize(p, "TOKEN_MAX", 16000),
            concurrency: profiled_env_usize(p, "CONCURRENCY", 4),
            max_retries: profiled_env_u32(p, "MAX_RETRIES", 0),
            retry_backoff_ms: profiled_env_u64(p, "RETRY_BACKOFF_MS", 500),
            tokenizer: profiled_env_opt(p, "DISTILL_TOKENIZER")
                .and_then(|v| TokenCounter::parse(&v))
                .unwrap_or_default(),
            map_prompt_path: profiled_env_opt(p, "MAP_PROMPT_PATH"),
            reduce_prompt_path: profiled_env_opt(p, "REDUCE_PROMPT_PATH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_upstream_tool() {
        let cfg = SummarizeConfig::from_env_profiled("UNSET_TEST_PROFILE");
        assert_eq!(cfg.chunk_size, 12000);
        assert_eq!(cfg.chunk_overlap, 0);
        assert_eq!(cfg.token_max, 16000);
        assert_eq!(cfg.tokenizer, TokenCounter::Words);
    }

    #[test]
    fn redacted_summary_has_no_keys() {
        let config = Config::for_profile("UNSET_TEST_PROFILE");
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("api_key"));
        assert!(!summary.contains("sk-"));
    }
}
