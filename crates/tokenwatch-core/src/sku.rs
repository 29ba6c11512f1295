//! Static cost and power profiles per accelerator SKU

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cost and power characteristics of one hardware model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuProfile {
    /// SKU identifier, e.g. "A100"
    pub sku: String,

    /// Rental or amortized cost per hour in USD
    #[serde(rename = "hourly_cost_usd")]
    pub hourly_cost: f64,

    /// Typical board power in watts
    #[serde(rename = "typical_power_draw_watts")]
    pub power_draw_watts: f64,

    /// Maximum safe temperature in Celsius
    #[serde(rename = "max_temperature_celsius")]
    pub max_temperature: f64,

    /// Memory capacity in MB
    pub max_memory_mb: f64,
}

impl SkuProfile {
    /// Create a new profile
    pub fn new(
        sku: impl Into<String>,
        hourly_cost: f64,
        power_draw_watts: f64,
        max_temperature: f64,
        max_memory_mb: f64,
    ) -> Self {
        Self {
            sku: sku.into(),
            hourly_cost,
            power_draw_watts,
            max_temperature,
            max_memory_mb,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sku.is_empty() {
            return Err(Error::config("SKU profile with empty name"));
        }
        if self.hourly_cost < 0.0 {
            return Err(Error::config(format!(
                "SKU {}: hourly cost must not be negative",
                self.sku
            )));
        }
        if self.power_draw_watts <= 0.0 {
            return Err(Error::config(format!("SKU {}: power draw must be positive", self.sku)));
        }
        if self.max_temperature <= 0.0 {
            return Err(Error::config(format!(
                "SKU {}: max temperature must be positive",
                self.sku
            )));
        }
        Ok(())
    }
}

/// Outcome of looking a SKU up in the table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkuResolution<'a> {
    /// The requested SKU has its own profile
    Exact(&'a SkuProfile),
    /// The requested SKU is unknown; the default profile stands in
    Fallback {
        requested: &'a str,
        profile: &'a SkuProfile,
    },
}

impl<'a> SkuResolution<'a> {
    /// Profile to compute with
    pub fn profile(&self) -> &'a SkuProfile {
        match self {
            SkuResolution::Exact(profile) => profile,
            SkuResolution::Fallback { profile, .. } => profile,
        }
    }

    /// Whether the default profile was substituted
    pub fn is_fallback(&self) -> bool {
        matches!(self, SkuResolution::Fallback { .. })
    }
}

/// Lookup table of SKU profiles with a designated default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuTable {
    /// SKU used when a lookup misses
    pub default_sku: String,

    /// Known profiles
    pub profiles: Vec<SkuProfile>,
}

impl SkuTable {
    /// Build and validate a table
    pub fn new(profiles: Vec<SkuProfile>, default_sku: impl Into<String>) -> Result<Self> {
        let table = Self {
            default_sku: default_sku.into(),
            profiles,
        };
        table.validate()?;
        Ok(table)
    }

    /// Profiles for the accelerators tokenwatch ships with
    pub fn builtin() -> Self {
        Self {
            default_sku: "A100".to_string(),
            profiles: vec![
                SkuProfile::new("A100", 2.50, 400.0, 83.0, 81920.0),
                SkuProfile::new("V100", 1.20, 300.0, 80.0, 32768.0),
                SkuProfile::new("H100", 4.00, 700.0, 85.0, 81920.0),
                SkuProfile::new("RTX4090", 0.80, 450.0, 90.0, 24576.0),
            ],
        }
    }

    /// Check that every profile is sane, names are unique and the default exists
    pub fn validate(&self) -> Result<()> {
        for (i, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            if self.profiles[..i].iter().any(|p| p.sku == profile.sku) {
                return Err(Error::config(format!("duplicate SKU profile: {}", profile.sku)));
            }
        }
        if self.get(&self.default_sku).is_none() {
            return Err(Error::config(format!(
                "default SKU {} has no profile",
                self.default_sku
            )));
        }
        Ok(())
    }

    /// Load a table from a YAML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table: SkuTable = serde_yaml::from_str(&content)?;
        table.validate()?;
        Ok(table)
    }

    /// Exact lookup
    pub fn get(&self, sku: &str) -> Option<&SkuProfile> {
        self.profiles.iter().find(|p| p.sku == sku)
    }

    /// Look up a SKU, substituting the default profile on a miss
    pub fn resolve<'a>(&'a self, sku: &'a str) -> SkuResolution<'a> {
        if let Some(profile) = self.get(sku) {
            return SkuResolution::Exact(profile);
        }
        // validate() guarantees the default exists; an unvalidated table uses the first entry
        let profile = self
            .get(&self.default_sku)
            .or_else(|| self.profiles.first())
            .unwrap_or_else(|| builtin_a100());
        SkuResolution::Fallback {
            requested: sku,
            profile,
        }
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the table has no profiles
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for SkuTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_a100() -> &'static SkuProfile {
    static A100: std::sync::OnceLock<SkuProfile> = std::sync::OnceLock::new();
    A100.get_or_init(|| SkuProfile::new("A100", 2.50, 400.0, 83.0, 81920.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = SkuTable::builtin();
        table.validate().unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get("H100").unwrap().power_draw_watts, 700.0);
    }

    #[test]
    fn test_exact_resolution() {
        let table = SkuTable::builtin();
        let resolution = table.resolve("V100");
        assert!(!resolution.is_fallback());
        assert_eq!(resolution.profile().sku, "V100");
        assert_eq!(resolution.profile().hourly_cost, 1.20);
    }

    #[test]
    fn test_fallback_resolution_is_observable() {
        let table = SkuTable::builtin();
        let resolution = table.resolve("MI300X");
        assert!(resolution.is_fallback());
        assert_eq!(resolution.profile().sku, "A100");
        match resolution {
            SkuResolution::Fallback { requested, .. } => assert_eq!(requested, "MI300X"),
            SkuResolution::Exact(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn test_validation_rejects_bad_tables() {
        let v100 = SkuProfile::new("V100", 1.2, 300.0, 80.0, 32768.0);
        let missing_default = SkuTable::new(vec![v100], "A100");
        assert!(missing_default.is_err());

        let duplicate = SkuTable::new(
            vec![
                SkuProfile::new("A100", 2.5, 400.0, 83.0, 81920.0),
                SkuProfile::new("A100", 3.0, 400.0, 83.0, 81920.0),
            ],
            "A100",
        );
        assert!(duplicate.is_err());

        let unpowered = SkuProfile::new("A100", 2.5, 0.0, 83.0, 81920.0);
        let zero_power = SkuTable::new(vec![unpowered], "A100");
        assert!(zero_power.is_err());
    }

    #[test]
    fn test_profile_serde_field_names() {
        let yaml = "sku: L4\n\
            hourly_cost_usd: 0.7\n\
            typical_power_draw_watts: 72\n\
            max_temperature_celsius: 85\n\
            max_memory_mb: 24576\n";
        let profile: SkuProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile, SkuProfile::new("L4", 0.7, 72.0, 85.0, 24576.0));
    }

    #[test]
    fn test_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let yaml = serde_yaml::to_string(&SkuTable::builtin()).unwrap();
        std::io::Write::write_all(&mut file, yaml.as_bytes()).unwrap();

        let table = SkuTable::from_file(file.path()).unwrap();
        assert_eq!(table, SkuTable::builtin());
    }

    #[test]
    fn test_table_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let yaml = r#"
default_sku: B200
profiles:
  - sku: A100
    hourly_cost_usd: 2.5
    typical_power_draw_watts: 400
    max_temperature_celsius: 83
    max_memory_mb: 81920
"#;
        std::io::Write::write_all(&mut file, yaml.as_bytes()).unwrap();

        let err = SkuTable::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
