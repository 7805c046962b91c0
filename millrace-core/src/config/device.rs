//! Controller behaviour configuration
//!
//! Bus settings, default thresholds, PWM limits and control cadence.

use super::layout::RegisterLayout;

/// How an actuator reacts to a temperature against a low/high pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThresholdPolicy {
    /// On at or above high, or at or below low
    #[default]
    Band,
    /// On at or above high only
    UpperOnly,
}

impl ThresholdPolicy {
    /// Whether an actuator should run for this reading
    ///
    /// `None` is a disconnected probe, which never engages anything.
    pub fn engaged(self, reading: Option<i16>, low: i16, high: i16) -> bool {
        match (self, reading) {
            (_, None) => false,
            (Self::Band, Some(t)) => t >= high || t <= low,
            (Self::UpperOnly, Some(t)) => t >= high,
        }
    }
}

/// Modbus line settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModbusConfig {
    /// Slave address (1-247)
    pub slave_id: u8,
    /// Line speed, 8 data bits, even parity, 1 stop bit
    pub baudrate: u32,
    /// Consecutive line/frame errors tolerated before reinitialising
    pub max_errors: u8,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            slave_id: 1,
            baudrate: 9600,
            max_errors: 10,
        }
    }
}

/// Threshold register defaults, written once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThresholdDefaults {
    /// Motor temperature critical limit (centi-°C)
    pub motor_temp_critical: i16,
    /// Motor temperature warning limit (centi-°C)
    pub motor_temp_warning: i16,
    /// Motor current critical limit (mA)
    pub motor_current_critical: u16,
    pub air_temp_low: i16,
    pub air_temp_high: i16,
    pub water_temp_low: i16,
    pub water_temp_high: i16,
}

impl Default for ThresholdDefaults {
    fn default() -> Self {
        Self {
            motor_temp_critical: 6000,
            motor_temp_warning: 5000,
            motor_current_critical: 900,
            air_temp_low: 5000,
            air_temp_high: 6000,
            water_temp_low: 5000,
            water_temp_high: 6000,
        }
    }
}

/// PWM frequency limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmLimits {
    /// Frequency applied at startup (Hz)
    pub default_hz: u32,
    pub min_hz: u32,
    pub max_hz: u32,
}

impl Default for PwmLimits {
    fn default() -> Self {
        Self {
            default_hz: 1000,
            min_hz: 100,
            max_hz: 30_000,
        }
    }
}

impl PwmLimits {
    /// Clamp a requested frequency into range; 0 is rejected
    pub fn clamp(&self, hz: u32) -> Option<u32> {
        if hz == 0 {
            return None;
        }
        Some(hz.clamp(self.min_hz, self.max_hz))
    }
}

/// Control loop cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Schedule {
    /// Interval between motor safety passes (ms)
    pub motor_period_ms: u32,
    /// Motors updated between two bus polls
    pub motor_batch: usize,
    /// Interval between temperature conversions (ms)
    pub temperature_period_ms: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            motor_period_ms: 500,
            motor_batch: 3,
            temperature_period_ms: 1000,
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub modbus: ModbusConfig,
    pub registers: RegisterLayout,
    pub thresholds: ThresholdDefaults,
    pub pwm: PwmLimits,
    pub schedule: Schedule,
    /// Policy for the fan and the mixer
    pub actuator_policy: ThresholdPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_clamp() {
        let limits = PwmLimits::default();
        assert_eq!(limits.clamp(0), None);
        assert_eq!(limits.clamp(50), Some(100));
        assert_eq!(limits.clamp(1000), Some(1000));
        assert_eq!(limits.clamp(50_000), Some(30_000));
    }

    #[test]
    fn test_band_policy() {
        let policy = ThresholdPolicy::Band;
        assert!(policy.engaged(Some(6000), 5000, 6000));
        assert!(policy.engaged(Some(4000), 5000, 6000));
        assert!(!policy.engaged(Some(5500), 5000, 6000));
        assert!(!policy.engaged(None, 5000, 6000));
    }

    #[test]
    fn test_upper_only_policy() {
        let policy = ThresholdPolicy::UpperOnly;
        assert!(policy.engaged(Some(6100), 5000, 6000));
        assert!(!policy.engaged(Some(4000), 5000, 6000));
        assert!(!policy.engaged(None, 5000, 6000));
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.modbus.slave_id, 1);
        assert_eq!(config.modbus.baudrate, 9600);
        assert_eq!(config.pwm.default_hz, 1000);
        assert_eq!(config.thresholds.motor_current_critical, 900);
        assert_eq!(config.actuator_policy, ThresholdPolicy::Band);
    }
}
