use std::env;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReflectConfig {
    /// How far the source window may grow while hunting for a clean parse.
    pub max_window_lines: usize,
    /// Alignment column cap for captured fragments; longer fragments wrap.
    pub snip_width_cap: usize,
    /// Column budget handed to the value pretty-printer.
    pub pretty_width: usize,
}

impl Default for ReflectConfig {
    fn default() -> Self {
        ReflectConfig {
            max_window_lines: 64,
            snip_width_cap: 50,
            pretty_width: 79,
        }
    }
}

impl ReflectConfig {
    pub fn from_env() -> ReflectConfig {
        let mut config = ReflectConfig::default();
        if let Some(value) = env_usize("ASSERT_REFLECT_MAX_WINDOW_LINES") {
            config.max_window_lines = value;
        }
        if let Some(value) = env_usize("ASSERT_REFLECT_SNIP_WIDTH_CAP") {
            config.snip_width_cap = value;
        }
        if let Some(value) = env_usize("ASSERT_REFLECT_PRETTY_WIDTH") {
            config.pretty_width = value;
        }
        config
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReflectConfig::default();
        assert_eq!(config.max_window_lines, 64);
        assert_eq!(config.snip_width_cap, 50);
        assert_eq!(config.pretty_width, 79);
    }
}
