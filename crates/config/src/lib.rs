use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uartwire_core::regs;
use uartwire_core::{PollPolicy, ReadyModel, Termination};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("Register window of {size} bytes cannot hold tx_data at offset {offset:#x}")]
    WindowTooSmall { size: u64, offset: u64 },
    #[error("Base address {0:#x} is not 32-bit aligned")]
    MisalignedBase(u64),
    #[error("'poll_limit' must be greater than zero")]
    ZeroPollLimit,
    #[error("Input 'lines' cannot be empty")]
    NoLines,
    #[error("'wire_equals_hex' is not valid hex: {0}")]
    BadHex(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub ready: ReadyModel,
}

fn default_base() -> u64 {
    regs::DEFAULT_BASE as u64
}

fn default_window() -> String {
    "16B".to_string()
}

/// One UART instance: where it lives, how to wait on it, how strings end.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(default = "default_base")]
    pub base_address: u64,
    #[serde(default = "default_window")]
    pub window: String, // e.g. "16B"
    #[serde(default)]
    pub poll_limit: Option<u64>,
    #[serde(default)]
    pub termination: Termination,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_address: default_base(),
            window: default_window(),
            poll_limit: None,
            termination: Termination::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl DeviceProfile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open device profile at {:?}", path.as_ref()))?;
        let profile: Self =
            serde_yaml::from_reader(f).context("Failed to parse Device Profile")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_address % 4 != 0 {
            return Err(ValidationError::MisalignedBase(self.base_address).into());
        }

        let size = parse_size(&self.window)?;
        if size < regs::WINDOW_SIZE {
            return Err(ValidationError::WindowTooSmall {
                size,
                offset: regs::TX_DATA,
            }
            .into());
        }

        if self.poll_limit == Some(0) {
            return Err(ValidationError::ZeroPollLimit.into());
        }

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        match self.poll_limit {
            Some(limit) => PollPolicy::Bounded(limit),
            None => PollPolicy::Spin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptInputs {
    /// Device profile path, relative to the script.
    #[serde(default)]
    pub profile: Option<String>,
    pub lines: Vec<String>,
    /// Overrides the profile's termination.
    #[serde(default)]
    pub termination: Option<Termination>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ScriptLimits {
    #[serde(default)]
    pub poll_limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    HardwareTimeout,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WireContainsAssertion {
    pub wire_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WireHexAssertion {
    pub wire_equals_hex: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutcomeAssertion {
    pub expected_outcome: Outcome,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScriptAssertion {
    WireContains(WireContainsAssertion),
    WireEqualsHex(WireHexAssertion),
    ExpectedOutcome(OutcomeAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TransmitScript {
    pub schema_version: String,
    pub inputs: ScriptInputs,
    #[serde(default)]
    pub limits: ScriptLimits,
    #[serde(default)]
    pub assertions: Vec<ScriptAssertion>,
}

impl TransmitScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open transmit script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Transmit Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            return Err(ValidationError::UnsupportedSchema(self.schema_version.clone()).into());
        }

        if self.inputs.lines.is_empty() {
            return Err(ValidationError::NoLines.into());
        }

        if self.limits.poll_limit == Some(0) {
            return Err(ValidationError::ZeroPollLimit.into());
        }

        for assertion in &self.assertions {
            if let ScriptAssertion::WireEqualsHex(a) = assertion {
                decode_hex(&a.wire_equals_hex)?;
            }
        }

        Ok(())
    }

    /// Load the referenced profile (resolved against `script_dir`), or the default one.
    /// Script-level termination and poll limit take precedence.
    pub fn resolve_profile(&self, script_dir: &Path) -> Result<DeviceProfile> {
        let mut profile = match &self.inputs.profile {
            Some(p) => DeviceProfile::from_file(script_dir.join(p))?,
            None => DeviceProfile::default(),
        };
        if let Some(termination) = self.inputs.termination {
            profile.termination = termination;
        }
        if let Some(limit) = self.limits.poll_limit {
            profile.poll_limit = Some(limit);
        }
        Ok(profile)
    }
}

/// Decode a hex byte string, ignoring whitespace (`"68 69 0d 0a"`).
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| ValidationError::BadHex(e.to_string()).into())
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
