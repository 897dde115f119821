use log::LevelFilter;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming a TOML config file for plugin instances.
pub const CONFIG_ENV_VAR: &str = "WIREMUT_CONFIG";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigLogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<ConfigLogLevel> for LevelFilter {
    fn from(level: ConfigLogLevel) -> Self {
        match level {
            ConfigLogLevel::Off => LevelFilter::Off,
            ConfigLogLevel::Error => LevelFilter::Error,
            ConfigLogLevel::Warn => LevelFilter::Warn,
            ConfigLogLevel::Info => LevelFilter::Info,
            ConfigLogLevel::Debug => LevelFilter::Debug,
            ConfigLogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MutatorSettings {
    /// Characters appended by the append mutator, in order.
    #[serde(default = "default_alphabet")]
    pub alphabet: String,
    /// How many times the host should call `fuzz` per queue entry.
    #[serde(default = "default_fuzz_count")]
    pub fuzz_count: u32,
}

pub fn default_alphabet() -> String {
    "0123456789ABCDEF".to_string()
}

pub fn default_fuzz_count() -> u32 {
    1
}

impl Default for MutatorSettings {
    fn default() -> Self {
        Self {
            alphabet: default_alphabet(),
            fuzz_count: default_fuzz_count(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsSettings {
    #[serde(default)]
    pub level: ConfigLogLevel,
    /// Dump raw buffers alongside the diagnostic lines.
    #[serde(default)]
    pub hexdump: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct WiremutConfig {
    #[serde(default)]
    pub mutator: MutatorSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
}

impl WiremutConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to load config file {:?}: {}", path, e)
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: WiremutConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by [`CONFIG_ENV_VAR`], or the defaults when the
    /// variable is unset.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load_from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.mutator.alphabet.is_empty() {
            anyhow::bail!("mutator.alphabet must contain at least one character");
        }
        if self.mutator.fuzz_count == 0 {
            anyhow::bail!("mutator.fuzz-count must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_hex_alphabet_and_quiet_diagnostics() {
        let config = WiremutConfig::default();
        assert_eq!(config.mutator.alphabet, "0123456789ABCDEF");
        assert_eq!(config.mutator.fuzz_count, 1);
        assert_eq!(config.diagnostics.level, ConfigLogLevel::Warn);
        assert!(!config.diagnostics.hexdump);
    }

    #[test]
    fn parses_kebab_case_sections() {
        let config = WiremutConfig::from_toml_str(
            r#"
            [mutator]
            alphabet = "xyz"
            fuzz-count = 4

            [diagnostics]
            level = "debug"
            hexdump = true
            "#,
        )
        .unwrap();
        assert_eq!(config.mutator.alphabet, "xyz");
        assert_eq!(config.mutator.fuzz_count, 4);
        assert_eq!(LevelFilter::from(config.diagnostics.level), LevelFilter::Debug);
        assert!(config.diagnostics.hexdump);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = WiremutConfig::from_toml_str("[diagnostics]\nlevel = \"off\"\n").unwrap();
        assert_eq!(config.mutator.alphabet, default_alphabet());
        assert_eq!(config.diagnostics.level, ConfigLogLevel::Off);
    }

    #[test]
    fn rejects_unknown_fields_and_empty_alphabet() {
        assert!(WiremutConfig::from_toml_str("[mutator]\nbogus = 1\n").is_err());
        assert!(WiremutConfig::from_toml_str("[mutator]\nalphabet = \"\"\n").is_err());
        assert!(WiremutConfig::from_toml_str("[mutator]\nfuzz-count = 0\n").is_err());
    }

    #[test]
    fn load_from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mutator]\nalphabet = \"ab\"").unwrap();
        let config = WiremutConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.mutator.alphabet, "ab");
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WiremutConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
