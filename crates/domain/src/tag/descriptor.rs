use serde::{Deserialize, Serialize};

use super::TagValue;
use crate::error::{DomainError, Result};

/// Highest raw count of a 12-bit DAC/ADC channel.
pub const DAC_FULL_SCALE: f64 = 4095.0;

/// Direction(s) in which a tag may be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[serde(alias = "r")]
    Read,
    #[serde(alias = "w")]
    Write,
    #[default]
    #[serde(alias = "rw")]
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Transform between a physical raw value and its application units
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScalingKind {
    #[default]
    None,
    /// 0..=4095 counts mapped linearly onto `[min, max]`
    LinearDac12,
    /// Hardware already reports engineering units
    PassThrough,
    /// Unrecognised kind from the tag table; values pass through unchanged
    Unknown(String),
}

impl From<String> for ScalingKind {
    fn from(kind: String) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "dac" | "dac12" | "linear_12bit_dac" | "linear-12bit-dac" => Self::LinearDac12,
            "pass_through" | "pass-through" | "passthrough" => Self::PassThrough,
            _ => Self::Unknown(kind),
        }
    }
}

impl From<ScalingKind> for String {
    fn from(kind: ScalingKind) -> Self {
        match kind {
            ScalingKind::None => "none".to_string(),
            ScalingKind::LinearDac12 => "dac12".to_string(),
            ScalingKind::PassThrough => "pass_through".to_string(),
            ScalingKind::Unknown(s) => s,
        }
    }
}

/// One entry of the tag table as written in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagDefinition {
    #[serde(default)]
    pub physical: Option<String>,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub scaling: ScalingKind,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub default: Option<TagValue>,
    #[serde(default)]
    pub internal: bool,
}

/// Validated description of a symbolic tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDescriptor {
    pub name: String,
    /// `None` for derived/internal-only tags
    pub physical: Option<String>,
    pub access: AccessMode,
    pub scaling: ScalingKind,
    pub range: Option<(f64, f64)>,
    pub unit: Option<String>,
    pub default: Option<TagValue>,
    pub internal: bool,
}

impl TagDescriptor {
    /// Validates a definition under the given symbolic name.
    pub fn from_definition(name: impl Into<String>, def: TagDefinition) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Config("Tag name cannot be empty".to_string()));
        }

        let physical = match def.physical {
            Some(p) if p.trim().is_empty() => {
                return Err(DomainError::Config(format!(
                    "Tag {name} has an empty physical name"
                )));
            }
            other => other,
        };

        let range = match (def.min, def.max) {
            (Some(min), Some(max)) if min < max => Some((min, max)),
            (Some(min), Some(max)) => {
                return Err(DomainError::Config(format!(
                    "Tag {name} has an empty range [{min}, {max}]"
                )));
            }
            (None, None) => None,
            _ => {
                return Err(DomainError::Config(format!(
                    "Tag {name} must declare both min and max"
                )));
            }
        };

        if def.scaling == ScalingKind::LinearDac12 && range.is_none() {
            return Err(DomainError::Config(format!(
                "Tag {name} uses dac12 scaling without a range"
            )));
        }

        let internal = def.internal || physical.is_none();

        Ok(Self {
            name,
            physical: if internal { None } else { physical },
            access: def.access,
            scaling: def.scaling,
            range,
            unit: def.unit,
            default: def.default,
            internal,
        })
    }

    /// Converts a raw hardware value into application units.
    pub fn scale(&self, raw: &TagValue) -> Result<TagValue> {
        match &self.scaling {
            ScalingKind::None | ScalingKind::PassThrough | ScalingKind::Unknown(_) => {
                Ok(raw.clone())
            }
            ScalingKind::LinearDac12 => {
                let (min, max) = self.dac_range()?;
                let counts = raw.as_f64().ok_or_else(|| {
                    DomainError::Range(format!("{}: raw value {raw} is not numeric", self.name))
                })?;
                if !(0.0..=DAC_FULL_SCALE).contains(&counts) {
                    return Err(DomainError::Range(format!(
                        "{}: raw value {counts} outside [0, {DAC_FULL_SCALE}]",
                        self.name
                    )));
                }
                Ok(TagValue::Number(min + (max - min) * counts / DAC_FULL_SCALE))
            }
        }
    }

    /// Converts an application-unit value into the raw value to write.
    pub fn unscale(&self, value: &TagValue) -> Result<TagValue> {
        match &self.scaling {
            ScalingKind::None | ScalingKind::PassThrough | ScalingKind::Unknown(_) => {
                Ok(value.clone())
            }
            ScalingKind::LinearDac12 => {
                let (min, max) = self.dac_range()?;
                let v = value.as_f64().ok_or_else(|| {
                    DomainError::Range(format!("{}: value {value} is not numeric", self.name))
                })?;
                if v < min || v > max {
                    return Err(DomainError::Range(format!(
                        "{}: value {v} outside [{min}, {max}]",
                        self.name
                    )));
                }
                let counts = ((v - min) / (max - min) * DAC_FULL_SCALE).round();
                Ok(TagValue::Number(counts))
            }
        }
    }

    /// Whether `value` lies within the declared range (tags without one accept anything numeric).
    pub fn in_range(&self, value: f64) -> bool {
        match self.range {
            Some((min, max)) => value >= min && value <= max,
            None => value.is_finite(),
        }
    }

    fn dac_range(&self) -> Result<(f64, f64)> {
        self.range.ok_or_else(|| {
            DomainError::Config(format!("{} uses dac12 scaling without a range", self.name))
        })
    }
}
