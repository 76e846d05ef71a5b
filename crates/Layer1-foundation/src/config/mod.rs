//! Relay Config - 통합 설정
//!
//! `relay.toml`에서 로드하고, 없으면 기본값을 사용합니다.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 설정 파일명
pub const RELAY_CONFIG_FILE: &str = "relay.toml";

// ============================================================================
// Relay Config (통합)
// ============================================================================

/// Relay 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Backend 연결 설정
    pub backend: BackendConfig,

    /// 스트림 세션 설정
    pub stream: StreamConfig,
}

/// Backend 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Task API base URL
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// 스트림 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bounded wait for a cancellation to be acknowledged (milliseconds)
    pub cancel_grace_ms: u64,

    /// Connect timeout for opening a stream (milliseconds)
    pub connect_timeout_ms: u64,

    /// Capacity of the session notice broadcast channel
    pub notice_capacity: usize,

    /// Optional cap on concurrently live sessions (resource policy)
    pub max_concurrent: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cancel_grace_ms: 5_000,
            connect_timeout_ms: 30_000,
            notice_capacity: 256,
            max_concurrent: None,
        }
    }
}

impl StreamConfig {
    /// 취소 승인 대기 시간
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// 연결 타임아웃
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 설정 로드 (없으면 기본값)
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No relay.toml found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// 지정한 파일에서 로드
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded relay config");
        Ok(config)
    }

    /// 지정한 파일로 저장
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// 글로벌 설정 파일 경로 (`<config_dir>/relay/relay.toml`)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relay").join(RELAY_CONFIG_FILE))
    }
}
