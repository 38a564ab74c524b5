//! Runtime Configuration for MuleWatch
//!
//! Every detection threshold and service knob lives here so a deployment
//! can be tuned through the environment or a TOML file without touching
//! detector code.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

// ============================================
// TIMESTAMP POLICY
// ============================================

/// How ingest treats inputs without a timestamp column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPolicy {
    /// Reject inputs without timestamps - all detectors available
    Required,

    /// Accept timestamp-less inputs in a degraded cycle-only mode
    /// (windowed detectors are skipped, velocity bonuses never fire)
    Optional,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        TimestampPolicy::Required
    }
}

impl std::fmt::Display for TimestampPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampPolicy::Required => write!(f, "REQUIRED"),
            TimestampPolicy::Optional => write!(f, "OPTIONAL"),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct for MuleWatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Service Settings ==========
    /// Bind host for the HTTP service
    pub host: String,

    /// Bind port for the HTTP service
    pub port: u16,

    /// Directory where uploads are spooled before analysis
    pub upload_dir: String,

    /// Maximum accepted request body in megabytes
    pub max_upload_mb: usize,

    // ========== Partial Pass ==========
    /// Row cap for the synchronous first pass; anything larger finishes
    /// in the background full pass
    pub partial_row_limit: usize,

    // ========== Ingest Settings ==========
    /// Whether a timestamp column is mandatory
    pub timestamp_policy: TimestampPolicy,

    // ========== Cycle Search ==========
    /// Shortest cycle worth flagging (3 = classic round-trip)
    pub cycle_min_len: usize,

    /// Longest cycle to enumerate
    pub cycle_max_len: usize,

    /// Wall-clock budget for cycle enumeration, in seconds
    pub cycle_deadline_secs: u64,

    /// Cap on merged cycle rings kept per run
    pub max_cycle_rings: usize,

    // ========== Smurfing ==========
    /// Distinct counterparties inside one window to flag a hub
    pub fan_threshold: usize,

    /// Structuring window width in hours
    pub fan_window_hours: i64,

    // ========== Shell Chains ==========
    /// Total degree at or below which an account counts as a shell
    pub shell_max_degree: usize,

    /// Minimum hops for a chain to qualify
    pub shell_min_hops: usize,

    /// Hard bound on explored path length, in nodes
    pub shell_max_chain_len: usize,

    /// Wall-clock budget for the chain search, in seconds
    pub shell_deadline_secs: u64,

    // ========== Legitimacy Filter ==========
    /// One-directional degree that marks a pure sink/source legitimate
    pub legit_sink_degree: usize,

    /// Edge count on one side before the regularity rule applies
    pub legit_side_edges: usize,

    /// Distinct counterparties required on that side
    pub legit_min_counterparties: usize,

    /// Coefficient of variation under which amounts count as regular
    pub legit_max_amount_cv: f64,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Service
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_upload_mb: env::var("MAX_UPLOAD_MB")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),

            // Partial pass
            partial_row_limit: env::var("PARTIAL_ROW_LIMIT")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15000),

            // Ingest
            timestamp_policy: match env::var("TIMESTAMP_POLICY")
                .unwrap_or_else(|_| "required".to_string())
                .to_lowercase()
                .as_str()
            {
                "optional" => TimestampPolicy::Optional,
                _ => TimestampPolicy::Required,
            },

            // Cycle search
            cycle_min_len: env::var("CYCLE_MIN_LEN")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            cycle_max_len: env::var("CYCLE_MAX_LEN")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            cycle_deadline_secs: env::var("CYCLE_DEADLINE_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            max_cycle_rings: env::var("MAX_CYCLE_RINGS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Smurfing
            fan_threshold: env::var("FAN_THRESHOLD")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            fan_window_hours: env::var("FAN_WINDOW_HOURS")
                .unwrap_or_else(|_| "72".to_string())
                .parse()
                .unwrap_or(72),

            // Shell chains
            shell_max_degree: env::var("SHELL_MAX_DEGREE")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            shell_min_hops: env::var("SHELL_MIN_HOPS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            shell_max_chain_len: env::var("SHELL_MAX_CHAIN_LEN")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            shell_deadline_secs: env::var("SHELL_DEADLINE_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Legitimacy filter
            legit_sink_degree: env::var("LEGIT_SINK_DEGREE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            legit_side_edges: env::var("LEGIT_SIDE_EDGES")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            legit_min_counterparties: env::var("LEGIT_MIN_COUNTERPARTIES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            legit_max_amount_cv: env::var("LEGIT_MAX_AMOUNT_CV")
                .unwrap_or_else(|_| "0.3".to_string())
                .parse()
                .unwrap_or(0.3),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Socket address string the service binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration before starting a run
    pub fn validate(&self) -> Result<()> {
        if self.cycle_min_len < 3 {
            return Err(eyre::eyre!(
                "CYCLE_MIN_LEN < 3 flags back-and-forth transfers as rings"
            ));
        }
        if self.cycle_max_len < self.cycle_min_len {
            return Err(eyre::eyre!(
                "CYCLE_MAX_LEN ({}) must be >= CYCLE_MIN_LEN ({})",
                self.cycle_max_len,
                self.cycle_min_len
            ));
        }
        if self.cycle_max_len > 8 {
            return Err(eyre::eyre!(
                "CYCLE_MAX_LEN > 8 makes enumeration blow up on dense graphs"
            ));
        }
        if self.max_cycle_rings == 0 {
            return Err(eyre::eyre!("MAX_CYCLE_RINGS must be at least 1"));
        }
        if self.fan_threshold < 2 {
            return Err(eyre::eyre!(
                "FAN_THRESHOLD < 2 would flag every account with a counterparty"
            ));
        }
        if self.fan_window_hours < 1 {
            return Err(eyre::eyre!("FAN_WINDOW_HOURS must be at least 1"));
        }
        if self.shell_min_hops < 2 {
            return Err(eyre::eyre!(
                "SHELL_MIN_HOPS < 2 leaves no room for a shell interior"
            ));
        }
        if self.shell_max_chain_len <= self.shell_min_hops {
            return Err(eyre::eyre!(
                "SHELL_MAX_CHAIN_LEN ({}) must exceed SHELL_MIN_HOPS ({})",
                self.shell_max_chain_len,
                self.shell_min_hops
            ));
        }
        if self.legit_max_amount_cv <= 0.0 || self.legit_max_amount_cv >= 1.0 {
            return Err(eyre::eyre!(
                "LEGIT_MAX_AMOUNT_CV should be between 0 and 1 (currently {:.2})",
                self.legit_max_amount_cv
            ));
        }
        if self.partial_row_limit == 0 {
            return Err(eyre::eyre!("PARTIAL_ROW_LIMIT must be at least 1"));
        }
        if self.max_upload_mb == 0 {
            return Err(eyre::eyre!("MAX_UPLOAD_MB must be at least 1"));
        }
        if self.upload_dir.is_empty() {
            return Err(eyre::eyre!("UPLOAD_DIR must not be empty"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              MULEWATCH - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Bind Address:      {:^40} ║", self.bind_addr());
        println!("║ Upload Dir:        {:^40} ║", self.upload_dir);
        println!("║ Max Upload:        {:>37} MB ║", self.max_upload_mb);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PARTIAL PASS                                               ║");
        println!("║ • Row Limit:       {:^40} ║", self.partial_row_limit);
        println!("║ • Timestamps:      {:^40} ║", self.timestamp_policy);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CYCLE SEARCH                                               ║");
        println!(
            "║ • Length:          {:^40} ║",
            format!("{}..={}", self.cycle_min_len, self.cycle_max_len)
        );
        println!("║ • Deadline:        {:>38} s ║", self.cycle_deadline_secs);
        println!("║ • Ring Cap:        {:^40} ║", self.max_cycle_rings);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SMURFING                                                   ║");
        println!("║ • Fan Threshold:   {:^40} ║", self.fan_threshold);
        println!("║ • Window:          {:>38} h ║", self.fan_window_hours);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SHELL CHAINS                                               ║");
        println!("║ • Max Degree:      {:^40} ║", self.shell_max_degree);
        println!("║ • Min Hops:        {:^40} ║", self.shell_min_hops);
        println!("║ • Max Chain Len:   {:^40} ║", self.shell_max_chain_len);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ LEGITIMACY FILTER                                          ║");
        println!("║ • Sink Degree:     {:^40} ║", self.legit_sink_degree);
        println!(
            "║ • Regular Side:    {:^40} ║",
            format!(
                "{} edges / {} peers / CV<{}",
                self.legit_side_edges, self.legit_min_counterparties, self.legit_max_amount_cv
            )
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upload_dir: "./uploads".to_string(),
            max_upload_mb: 500,
            partial_row_limit: 15000,
            timestamp_policy: TimestampPolicy::Required,
            cycle_min_len: 3,
            cycle_max_len: 5,
            cycle_deadline_secs: 5,
            max_cycle_rings: 20,
            fan_threshold: 10,
            fan_window_hours: 72,
            shell_max_degree: 3,
            shell_min_hops: 3,
            shell_max_chain_len: 20,
            shell_deadline_secs: 5,
            legit_sink_degree: 100,
            legit_side_edges: 20,
            legit_min_counterparties: 15,
            legit_max_amount_cv: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_cycle_bounds_validation() {
        let mut config = Config::default();
        config.cycle_min_len = 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cycle_max_len = 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cycle_max_len = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fan_and_shell_validation() {
        let mut config = Config::default();
        config.fan_threshold = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shell_max_chain_len = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mulewatch.toml");

        let mut config = Config::default();
        config.port = 9999;
        config.fan_threshold = 7;
        config.timestamp_policy = TimestampPolicy::Optional;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.port, 9999);
        assert_eq!(loaded.fan_threshold, 7);
        assert_eq!(loaded.timestamp_policy, TimestampPolicy::Optional);
    }
}
