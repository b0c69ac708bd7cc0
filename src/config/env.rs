//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration. They are
//! applied on top of the config file and below command-line flags.

use std::env;
use std::path::PathBuf;

use super::AppConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "DEVNET_SIM";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Config file from DEVNET_SIM_CONFIG
    pub config_file: Option<String>,
    /// Gate capacity from DEVNET_SIM_MAX_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Slot hold time from DEVNET_SIM_LAUNCH_DELAY_MS
    pub launch_delay_ms: Option<u64>,
    /// Per-test timeout from DEVNET_SIM_TEST_TIMEOUT
    pub test_timeout: Option<u64>,
    /// Artifact directory from DEVNET_SIM_ARTIFACTS
    pub artifacts_dir: Option<String>,
    /// Verbose from DEVNET_SIM_VERBOSE
    pub verbose: Option<bool>,
    /// Output format from DEVNET_SIM_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            max_concurrent: get_env_parse("MAX_CONCURRENT"),
            launch_delay_ms: get_env_parse("LAUNCH_DELAY_MS"),
            test_timeout: get_env_parse("TEST_TIMEOUT"),
            artifacts_dir: get_env("ARTIFACTS"),
            verbose: get_env_bool("VERBOSE"),
            format: get_env("FORMAT"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.max_concurrent.is_some()
            || self.launch_delay_ms.is_some()
            || self.test_timeout.is_some()
            || self.artifacts_dir.is_some()
            || self.verbose.is_some()
            || self.format.is_some()
    }

    /// Override the settings present in the environment
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(max) = self.max_concurrent {
            config.max_concurrent = max;
        }
        if let Some(delay) = self.launch_delay_ms {
            config.launch_delay_ms = delay;
        }
        if let Some(timeout) = self.test_timeout {
            config.test_timeout_secs = timeout;
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir = PathBuf::from(dir);
        }
    }

    /// Get format with fallback
    pub fn format_or(&self, default: &str) -> String {
        self.format.clone().unwrap_or_else(|| default.to_string())
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_CONFIG:          {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_MAX_CONCURRENT:  {:?}", ENV_PREFIX, self.max_concurrent);
        println!("  {}_LAUNCH_DELAY_MS: {:?}", ENV_PREFIX, self.launch_delay_ms);
        println!("  {}_TEST_TIMEOUT:    {:?}", ENV_PREFIX, self.test_timeout);
        println!("  {}_ARTIFACTS:       {:?}", ENV_PREFIX, self.artifacts_dir);
        println!("  {}_VERBOSE:         {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_FORMAT:          {:?}", ENV_PREFIX, self.format);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all DEVNET_SIM environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG           Path to configuration file");
    println!("  {ENV_PREFIX}_MAX_CONCURRENT   Maximum tests in flight");
    println!("  {ENV_PREFIX}_LAUNCH_DELAY_MS  Slot hold time after each test (0 disables)");
    println!("  {ENV_PREFIX}_TEST_TIMEOUT     Per-test timeout in seconds");
    println!("  {ENV_PREFIX}_ARTIFACTS        Contract and genesis artifact directory");
    println!("  {ENV_PREFIX}_VERBOSE          Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_FORMAT           Output format (table, json, json-pretty, summary)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_MAX_CONCURRENT=8");
    println!("  export {ENV_PREFIX}_LAUNCH_DELAY_MS=0");
    println!("  devnet-sim run");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the life of the guard
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(name, value)| {
                    let key = format!("{ENV_PREFIX}_{name}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
        assert_eq!(config.format_or("table"), "table");
    }

    #[test]
    fn test_env_overrides_config() {
        let _guard = EnvGuard::set(&[
            ("MAX_CONCURRENT", "2"),
            ("LAUNCH_DELAY_MS", "0"),
            ("ARTIFACTS", "/tmp/artifacts"),
        ]);

        let env_config = EnvConfig::load();
        assert_eq!(env_config.max_concurrent, Some(2));
        assert!(env_config.has_any());

        let mut config = AppConfig::default();
        env_config.apply(&mut config);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.launch_delay_ms, 0);
        assert_eq!(config.artifacts_dir, PathBuf::from("/tmp/artifacts"));
        assert_eq!(config.test_timeout_secs, 120);
    }

    #[test]
    fn test_env_bool_and_bad_numbers() {
        let _guard = EnvGuard::set(&[("VERBOSE", "yes"), ("TEST_TIMEOUT", "soon")]);

        let config = EnvConfig::load();
        assert_eq!(config.verbose, Some(true));
        assert_eq!(config.test_timeout, None);
    }
}
