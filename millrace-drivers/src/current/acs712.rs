//! ACS712 Hall-effect current sensor
//!
//! The output rests at half the supply with no current and moves by a
//! fixed number of millivolts per amp. Motors only draw current one way,
//! so readings below the zero point clamp to 0.

use millrace_core::config::CurrentSenseConfig;

/// Voltage-to-current conversion for one sensor type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Acs712 {
    reference_mv: u32,
    zero_offset_mv: u32,
    millivolts_per_amp: u32,
}

impl Acs712 {
    pub const fn new(reference_mv: u32, zero_offset_mv: u32, millivolts_per_amp: u32) -> Self {
        Self {
            reference_mv,
            zero_offset_mv,
            millivolts_per_amp,
        }
    }

    pub fn from_config(config: &CurrentSenseConfig) -> Self {
        Self::new(
            config.reference_mv as u32,
            config.zero_offset_mv as u32,
            config.millivolts_per_amp as u32,
        )
    }

    /// Output voltage at zero current
    pub fn zero_offset_mv(&self) -> u32 {
        self.zero_offset_mv
    }

    /// Convert a raw ADC code to millivolts
    pub fn millivolts(&self, raw: u16, full_scale: u16) -> u32 {
        raw as u32 * self.reference_mv / full_scale.max(1) as u32
    }

    /// Convert a sensor voltage to milliamps
    pub fn milliamps(&self, millivolts: u32) -> u16 {
        let above_zero = millivolts.saturating_sub(self.zero_offset_mv);
        let ma = above_zero * 1000 / self.millivolts_per_amp.max(1);
        ma.min(u16::MAX as u32) as u16
    }
}

/// Exponential moving average with the weight of the new sample in permille
///
/// Seeded with the first sample so the output does not ramp up from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmaFilter {
    alpha_permille: u32,
    value: Option<u32>,
}

impl EmaFilter {
    pub const fn new(alpha_permille: u16) -> Self {
        let alpha = if alpha_permille > 1000 { 1000 } else { alpha_permille };
        Self {
            alpha_permille: alpha as u32,
            value: None,
        }
    }

    /// Feed a sample and return the filtered value
    pub fn update(&mut self, sample: u32) -> u32 {
        let next = match self.value {
            None => sample,
            Some(previous) => {
                let weighted = self.alpha_permille as u64 * sample as u64
                    + (1000 - self.alpha_permille) as u64 * previous as u64;
                ((weighted + 500) / 1000) as u32
            }
        };
        self.value = Some(next);
        next
    }

    /// Last filtered value, `None` before the first sample
    pub fn value(&self) -> Option<u32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sensor() -> Acs712 {
        Acs712::from_config(&CurrentSenseConfig::default())
    }

    #[test]
    fn test_raw_to_millivolts() {
        let sensor = sensor();
        assert_eq!(sensor.millivolts(2048, 4096), 1650);
        assert_eq!(sensor.millivolts(0, 4096), 0);
        assert_eq!(sensor.millivolts(4095, 4096), 3299);
    }

    #[test]
    fn test_millivolts_to_milliamps() {
        let sensor = sensor();
        assert_eq!(sensor.milliamps(1650), 0);
        assert_eq!(sensor.milliamps(1650 + 185), 1000);
        assert_eq!(sensor.milliamps(1650 + 37), 200);
    }

    #[test]
    fn test_reverse_current_clamps_to_zero() {
        assert_eq!(sensor().milliamps(1200), 0);
    }

    #[test]
    fn test_filter_seeds_with_first_sample() {
        let mut filter = EmaFilter::new(150);
        assert_eq!(filter.value(), None);
        assert_eq!(filter.update(1650), 1650);
        assert_eq!(filter.update(1835), 1678);
    }

    #[test]
    fn test_filter_reset() {
        let mut filter = EmaFilter::new(150);
        filter.update(1000);
        filter.reset();
        assert_eq!(filter.update(2000), 2000);
    }

    #[test]
    fn test_full_weight_tracks_input() {
        let mut filter = EmaFilter::new(1500);
        filter.update(100);
        assert_eq!(filter.update(900), 900);
    }

    proptest! {
        #[test]
        fn filter_stays_between_old_and_new(
            alpha in 0u16..=1000,
            first in 0u32..5000,
            second in 0u32..5000,
        ) {
            let mut filter = EmaFilter::new(alpha);
            filter.update(first);
            let out = filter.update(second);
            prop_assert!(out >= first.min(second));
            prop_assert!(out <= first.max(second));
        }
    }
}
