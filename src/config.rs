//! Runtime configuration.
//!
//! `Config` is assembled once at startup from CLI flags and environment
//! overrides. Values that change while the process is running (the living
//! note cursor, the batch interval, the batch size) live in the `config_kv`
//! store table instead (see `store::queries`), not here.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub root_path: PathBuf,
    pub db_path: PathBuf,
    pub debounce_ms: u64,
    pub http_addr: String,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub batch_interval: Duration,
    pub batch_max_size: usize,
    pub living_note_daily: bool,
}

impl Config {
    pub fn default_for_root(root_path: PathBuf) -> Self {
        let db_path = root_path.join(".obbywatch.db");
        Config {
            root_path,
            db_path,
            debounce_ms: 500,
            http_addr: "127.0.0.1:4173".to_string(),
            llm_base_url: std::env::var("OBBYWATCH_LLM_BASE_URL").ok(),
            llm_api_key: std::env::var("OBBYWATCH_LLM_API_KEY").ok(),
            llm_model: std::env::var("OBBYWATCH_LLM_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            batch_interval: Duration::from_secs(900),
            batch_max_size: 50,
            living_note_daily: std::env::var("OBBYWATCH_LIVING_NOTE_DAILY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn obbywatch_file(&self) -> PathBuf {
        self.root_path.join(".obbywatch")
    }

    pub fn obbyignore_file(&self) -> PathBuf {
        self.root_path.join(".obbyignore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_places_db_under_root() {
        let cfg = Config::default_for_root(PathBuf::from("/tmp/notes"));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/notes/.obbywatch.db"));
        assert_eq!(cfg.debounce_ms, 500);
    }

    #[test]
    fn obbywatch_and_obbyignore_live_at_root() {
        let cfg = Config::default_for_root(PathBuf::from("/tmp/notes"));
        assert_eq!(cfg.obbywatch_file(), PathBuf::from("/tmp/notes/.obbywatch"));
        assert_eq!(cfg.obbyignore_file(), PathBuf::from("/tmp/notes/.obbyignore"));
    }
}
