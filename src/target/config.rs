//! Target configuration for spill code.
//!
//! Spill slots are abstract until materialisation, when each one becomes a
//! word in the current stack frame addressed off a base register.

use super::registers::Register;
use serde::{Deserialize, Serialize};

/// How spill slots are laid out in the frame.
///
/// Slot `n` lives at `delta + n * slot_bytes` bytes from `frame_reg`, where
/// `delta` is the frame delta in effect at the spill or reload.
///
/// # Presets
///
/// | Preset | slot_bytes | frame_reg |
/// |--------|------------|-----------|
/// | default | 4 | sp |
/// | wide | 8 | sp |
/// | fp | 4 | fp |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Bytes per spill slot (power of two, 1-16)
    pub slot_bytes: u32,

    /// Base register for slot addressing (sp or fp)
    pub frame_reg: Register,
}

impl Default for TargetConfig {
    /// Default configuration: 4-byte slots off `sp`
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TargetConfig {
    /// 4-byte slots addressed off the stack pointer
    pub const DEFAULT: Self = Self {
        slot_bytes: 4,
        frame_reg: Register::SP,
    };

    /// 8-byte slots for wide values
    pub const WIDE: Self = Self {
        slot_bytes: 8,
        frame_reg: Register::SP,
    };

    /// 4-byte slots addressed off the frame pointer
    pub const FRAME_POINTER: Self = Self {
        slot_bytes: 4,
        frame_reg: Register::FP,
    };

    /// Get a preset configuration by name.
    ///
    /// Available presets: `"default"`, `"wide"`, `"fp"`.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::DEFAULT),
            "wide" => Some(Self::WIDE),
            "fp" | "frame-pointer" => Some(Self::FRAME_POINTER),
            _ => None,
        }
    }

    /// List available preset names.
    pub fn preset_names() -> &'static [&'static str] {
        &["default", "wide", "fp"]
    }

    /// Create a new configuration, checking it first.
    pub fn new(slot_bytes: u32, frame_reg: Register) -> Result<Self, ConfigError> {
        let config = Self { slot_bytes, frame_reg };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.slot_bytes.is_power_of_two() || self.slot_bytes > 16 {
            return Err(ConfigError::InvalidSlotSize(self.slot_bytes));
        }
        if self.frame_reg != Register::SP && self.frame_reg != Register::FP {
            return Err(ConfigError::InvalidFrameReg(self.frame_reg));
        }
        Ok(())
    }

    /// Byte offset of `slot` from the frame register at frame delta `delta`.
    ///
    /// `None` if the offset does not fit in a 32-bit immediate.
    #[inline]
    pub fn slot_offset(&self, delta: i32, slot: u32) -> Option<i32> {
        let offset = i64::from(slot)
            .checked_mul(i64::from(self.slot_bytes))?
            .checked_add(i64::from(delta))?;
        i32::try_from(offset).ok()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("slot_bytes must be a power of two in 1-16, got {0}")]
    InvalidSlotSize(u32),

    #[error("frame_reg must be sp or fp, got {0}")]
    InvalidFrameReg(Register),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TargetConfig::default();
        assert_eq!(config.slot_bytes, 4);
        assert_eq!(config.frame_reg, Register::SP);
        assert_eq!(config.slot_offset(0, 3), Some(12));
        assert_eq!(config.slot_offset(-8, 1), Some(-4));
    }

    #[test]
    fn test_slot_offset_out_of_range() {
        let wide = TargetConfig::WIDE;
        assert_eq!(wide.slot_offset(0, 0x1000_0000), None);
        assert_eq!(wide.slot_offset(i32::MAX, 1), None);
        assert_eq!(wide.slot_offset(-16, 0x1000_0000 - 1), Some(0x7fff_fff8 - 16));
        let narrow = TargetConfig::default();
        assert_eq!(narrow.slot_offset(i32::MIN, 0x3fff_ffff), Some(i32::MAX - 3));
        assert_eq!(narrow.slot_offset(0, u32::MAX), None);
    }

    #[test]
    fn test_validation() {
        assert!(TargetConfig::new(1, Register::SP).is_ok());
        assert!(TargetConfig::new(16, Register::FP).is_ok());
        assert_eq!(TargetConfig::new(0, Register::SP), Err(ConfigError::InvalidSlotSize(0)));
        assert_eq!(TargetConfig::new(6, Register::SP), Err(ConfigError::InvalidSlotSize(6)));
        assert_eq!(TargetConfig::new(32, Register::SP), Err(ConfigError::InvalidSlotSize(32)));
        assert_eq!(
            TargetConfig::new(4, Register::R5),
            Err(ConfigError::InvalidFrameReg(Register::R5))
        );
    }

    #[test]
    fn test_presets() {
        assert_eq!(TargetConfig::preset("default"), Some(TargetConfig::DEFAULT));
        assert_eq!(TargetConfig::preset("WIDE"), Some(TargetConfig::WIDE));
        assert_eq!(TargetConfig::preset("fp"), Some(TargetConfig::FRAME_POINTER));
        assert_eq!(TargetConfig::preset("huge"), None);
    }

    #[test]
    fn test_preset_configs_valid() {
        for name in TargetConfig::preset_names() {
            let config = TargetConfig::preset(name).unwrap();
            assert!(config.validate().is_ok(), "preset {} should be valid", name);
        }
    }

    #[test]
    fn test_config_serde() {
        let json = serde_json::to_string(&TargetConfig::WIDE).unwrap();
        let back: TargetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TargetConfig::WIDE);
    }
}
