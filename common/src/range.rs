use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{config::RangeLimits, error::RangeLimitReached};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDirection {
    Lower,
    Raise,
}

impl fmt::Display for RangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lower => f.write_str("lower"),
            Self::Raise => f.write_str("raise"),
        }
    }
}

/// Four thresholds that move together. Heating engages at or below
/// `heat_temp_f`, cooling at or above `cool_temp_f`, and an active channel is
/// wound down once the reading settles inside `[floor_f, ceiling_f]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisBand {
    #[serde(rename = "heatTemp")]
    pub heat_temp_f: f32,
    #[serde(rename = "floor")]
    pub floor_f: f32,
    #[serde(rename = "ceiling")]
    pub ceiling_f: f32,
    #[serde(rename = "coolTemp")]
    pub cool_temp_f: f32,
}

impl Default for HysteresisBand {
    fn default() -> Self {
        let floor_f = 67.0;
        let ceiling_f = 68.0;
        Self {
            heat_temp_f: floor_f - 3.0,
            floor_f,
            ceiling_f,
            cool_temp_f: ceiling_f + 2.0,
        }
    }
}

impl HysteresisBand {
    pub fn is_ordered(&self) -> bool {
        self.heat_temp_f < self.floor_f
            && self.floor_f <= self.ceiling_f
            && self.ceiling_f < self.cool_temp_f
    }

    pub fn contains_steady(&self, temp_f: f32) -> bool {
        self.floor_f <= temp_f && temp_f <= self.ceiling_f
    }

    pub fn lowered(&self, limits: &RangeLimits) -> Result<Self, RangeLimitReached> {
        if self.heat_temp_f - 1.0 <= limits.min_heat_temp_f {
            return Err(RangeLimitReached {
                direction: RangeDirection::Lower,
                threshold_f: self.heat_temp_f,
                limit_f: limits.min_heat_temp_f,
            });
        }
        Ok(self.shifted(-1.0))
    }

    pub fn raised(&self, limits: &RangeLimits) -> Result<Self, RangeLimitReached> {
        if self.cool_temp_f + 1.0 >= limits.max_cool_temp_f {
            return Err(RangeLimitReached {
                direction: RangeDirection::Raise,
                threshold_f: self.cool_temp_f,
                limit_f: limits.max_cool_temp_f,
            });
        }
        Ok(self.shifted(1.0))
    }

    fn shifted(&self, delta_f: f32) -> Self {
        Self {
            heat_temp_f: self.heat_temp_f + delta_f,
            floor_f: self.floor_f + delta_f,
            ceiling_f: self.ceiling_f + delta_f,
            cool_temp_f: self.cool_temp_f + delta_f,
        }
    }
}

/// Owns the live band. Nothing else mutates it; the control tick receives
/// a copy.
#[derive(Debug, Clone)]
pub struct RangeManager {
    band: HysteresisBand,
    limits: RangeLimits,
}

impl RangeManager {
    pub fn new(band: HysteresisBand, limits: RangeLimits) -> Self {
        Self { band, limits }
    }

    pub fn band(&self) -> HysteresisBand {
        self.band
    }

    pub fn limits(&self) -> &RangeLimits {
        &self.limits
    }

    pub fn lower(&mut self) -> Result<HysteresisBand, RangeLimitReached> {
        self.band = self.band.lowered(&self.limits)?;
        Ok(self.band)
    }

    pub fn raise(&mut self) -> Result<HysteresisBand, RangeLimitReached> {
        self.band = self.band.raised(&self.limits)?;
        Ok(self.band)
    }

    pub fn adjust(
        &mut self,
        direction: RangeDirection,
    ) -> Result<HysteresisBand, RangeLimitReached> {
        match direction {
            RangeDirection::Lower => self.lower(),
            RangeDirection::Raise => self.raise(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn manager() -> RangeManager {
        RangeManager::new(HysteresisBand::default(), RangeLimits::default())
    }

    #[test]
    fn default_band_is_64_67_68_70() {
        let band = HysteresisBand::default();
        assert_eq!(band.heat_temp_f, 64.0);
        assert_eq!(band.floor_f, 67.0);
        assert_eq!(band.ceiling_f, 68.0);
        assert_eq!(band.cool_temp_f, 70.0);
        assert!(band.is_ordered());
    }

    #[test]
    fn every_adjustment_shifts_all_thresholds_by_one() {
        let mut range = manager();
        let mut previous = range.band();

        for direction in [
            RangeDirection::Raise,
            RangeDirection::Raise,
            RangeDirection::Lower,
            RangeDirection::Lower,
            RangeDirection::Lower,
        ] {
            let next = range.adjust(direction).unwrap();
            let delta = match direction {
                RangeDirection::Lower => -1.0,
                RangeDirection::Raise => 1.0,
            };
            assert_eq!(next.heat_temp_f - previous.heat_temp_f, delta);
            assert_eq!(next.floor_f - previous.floor_f, delta);
            assert_eq!(next.ceiling_f - previous.ceiling_f, delta);
            assert_eq!(next.cool_temp_f - previous.cool_temp_f, delta);
            assert!(next.is_ordered());
            previous = next;
        }
    }

    #[test]
    fn lowering_at_51_reaches_the_floor_limit() {
        let mut range = RangeManager::new(
            HysteresisBand {
                heat_temp_f: 51.0,
                floor_f: 54.0,
                ceiling_f: 55.0,
                cool_temp_f: 57.0,
            },
            RangeLimits::default(),
        );

        let err = range.lower().unwrap_err();

        assert_eq!(err.direction, RangeDirection::Lower);
        assert_eq!(err.threshold_f, 51.0);
        assert_eq!(err.limit_f, 50.0);
        assert_eq!(range.band().heat_temp_f, 51.0);
    }

    #[test]
    fn lowering_stops_one_step_above_the_floor() {
        let mut range = manager();
        let mut steps = 0;
        while range.lower().is_ok() {
            steps += 1;
        }

        assert_eq!(steps, 13);
        assert_eq!(range.band().heat_temp_f, 51.0);
        assert!(range.band().is_ordered());
    }

    #[test]
    fn raising_stops_one_step_below_the_ceiling() {
        let mut range = manager();
        let mut steps = 0;
        while range.raise().is_ok() {
            steps += 1;
        }

        assert_eq!(steps, 4);
        assert_eq!(range.band().cool_temp_f, 74.0);
        assert_eq!(range.band().floor_f, 71.0);
        let err = range.raise().unwrap_err();
        assert_eq!(err.direction, RangeDirection::Raise);
        assert_eq!(
            err.to_string(),
            "cannot raise range: 74F would reach the 75F limit"
        );
    }

    #[test]
    fn steady_window_is_inclusive() {
        let band = HysteresisBand::default();
        assert!(band.contains_steady(67.0));
        assert!(band.contains_steady(68.0));
        assert!(!band.contains_steady(66.9));
        assert!(!band.contains_steady(68.1));
    }
}
