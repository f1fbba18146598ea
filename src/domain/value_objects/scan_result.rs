use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single scan attempt, decided by the remote gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResult {
    Valid,
    Invalid,
    Duplicate,
    Error,
}

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::Valid => "valid",
            ScanResult::Invalid => "invalid",
            ScanResult::Duplicate => "duplicate",
            ScanResult::Error => "error",
        }
    }

    /// `error` は再スキャンで解決し得る。それ以外は利用者向けの最終結果。
    pub fn allows_rescan(&self) -> bool {
        matches!(self, ScanResult::Error)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
