use serde::{Deserialize, Serialize};

const DEFAULT_WALL_MS: u64 = 10_000;
const DEFAULT_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

/// Resource limits enforced on a sandboxed execution.
///
/// CPU and file-size limits are applied inside the child via `setrlimit`;
/// wall time and memory are watched by the parent's monitor thread, which
/// terminates the child on breach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub cpu_ms: Option<u64>,
    pub wall_ms: u64,
    pub memory_bytes: Option<u64>,
    pub file_size_bytes: Option<u64>,
    pub allow_network: bool,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            cpu_ms: None,
            wall_ms: DEFAULT_WALL_MS,
            memory_bytes: Some(DEFAULT_MEMORY_BYTES),
            file_size_bytes: None,
            allow_network: false,
        }
    }
}

impl SandboxLimits {
    /// Defaults, overridden by `SANDBOX_TIMEOUT_MS` / `SANDBOX_MEMORY_BYTES`.
    pub fn from_env() -> Self {
        let mut limits = SandboxLimits::default();
        if let Some(wall_ms) = env_u64("SANDBOX_TIMEOUT_MS") {
            limits.wall_ms = wall_ms;
        }
        if let Some(memory_bytes) = env_u64("SANDBOX_MEMORY_BYTES") {
            limits.memory_bytes = Some(memory_bytes);
        }
        limits
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.wall_ms, 10_000);
        assert!(!limits.allow_network);
        assert!(limits.memory_bytes.is_some());
    }
}
