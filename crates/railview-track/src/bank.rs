//! Super-elevation: how much a curve is banked and how the bank ramps in and out.
//!
//! Roll is measured about the direction of travel. Track banks into a curve,
//! so a curve toward +X gets a negative roll.

use crate::dtrack::DtrackData;

/// Rolls smaller than this (radians) count as level.
const LEVEL_EPSILON: f32 = 1.0e-6;

const FEET_PER_METER: f32 = 3.280_84;
const MPH_PER_MPS: f32 = 2.236_94;
const METERS_PER_INCH: f32 = 0.0254;

/// Super-elevation is rounded to this increment, meters.
const ELEVATION_STEP_M: f32 = 0.005;

/// Degrees of curvature per 100 ft of arc, times the radius in feet.
const DEGREE_OF_CURVE_FEET: f32 = 5729.58;

/// How roll varies across one subsection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BankProfile {
    None,
    /// Level at the start, `end` from the midpoint on.
    RampUp { end: f32 },
    /// `start` until the midpoint, level at the end.
    RampDown { start: f32 },
    /// Banked at both ends, interpolated linearly.
    Constant { start: f32, end: f32 },
    /// Level at both ends, `peak` at the midpoint. Used for isolated short curves.
    RampUpDown { peak: f32 },
}

impl BankProfile {
    /// Pick the profile from the rolls at the subsection ends and the roll the
    /// curve itself wants.
    pub fn classify(start: f32, end: f32, peak: f32) -> Self {
        let level = |roll: f32| roll.abs() < LEVEL_EPSILON;
        match (level(start), level(end)) {
            (true, true) if level(peak) => BankProfile::None,
            (true, true) => BankProfile::RampUpDown { peak },
            (true, false) => BankProfile::RampUp { end },
            (false, true) => BankProfile::RampDown { start },
            (false, false) => BankProfile::Constant { start, end },
        }
    }

    /// Roll at station `station` of `stations` intervals.
    pub fn target_roll(&self, station: u32, stations: u32) -> f32 {
        let n = stations.max(1) as f32;
        let i = station.min(stations) as f32;
        match *self {
            BankProfile::None => 0.0,
            BankProfile::RampUp { end } => end * (2.0 * i / n).min(1.0),
            BankProfile::RampDown { start } => start * (2.0 * (n - i) / n).min(1.0),
            BankProfile::Constant { start, end } => start + (end - start) * (i / n),
            BankProfile::RampUpDown { peak } => peak * (2.0 * i / n).min(2.0 * (n - i) / n),
        }
    }
}

/// Accumulated roll threaded through the stations of a ribbon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BankState {
    roll: f32,
}

impl BankState {
    pub const LEVEL: BankState = BankState { roll: 0.0 };

    pub fn roll(&self) -> f32 {
        self.roll
    }

    /// Move to `target`, returning the new state and the incremental roll to apply.
    pub fn step(self, target: f32) -> (BankState, f32) {
        (BankState { roll: target }, target - self.roll)
    }
}

/// Inputs to [`super_elevation_for`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElevationSettings {
    pub enabled: bool,
    pub scale: f32,
    /// Clamp for the rail height difference, meters.
    pub max_elevation_m: f32,
    /// Curves tighter than this are not banked.
    pub min_radius_m: f32,
    pub gauge_m: f32,
}

impl Default for ElevationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: 1.0,
            max_elevation_m: 0.15,
            min_radius_m: 100.0,
            gauge_m: 1.435,
        }
    }
}

/// Bank angle (radians, unsigned) for a curve of `radius_m` run at `speed_mps`.
///
/// Uses the AREMA rule `E = 0.0007 * D * V^2` with `E` in inches, `D` the
/// degree of curve per 100 ft and `V` in mph. The elevation is scaled,
/// rounded to 5 mm and clamped before being turned into an angle across the gauge.
pub fn super_elevation_for(radius_m: f32, speed_mps: f32, settings: &ElevationSettings) -> f32 {
    if !settings.enabled || radius_m < settings.min_radius_m || radius_m <= 0.0 {
        return 0.0;
    }
    let degree_of_curve = DEGREE_OF_CURVE_FEET / (radius_m * FEET_PER_METER);
    let mph = speed_mps * MPH_PER_MPS;
    let inches = 0.0007 * degree_of_curve * mph * mph;
    let meters = inches * METERS_PER_INCH * settings.scale;
    let meters = ((meters / ELEVATION_STEP_M).round() * ELEVATION_STEP_M)
        .clamp(0.0, settings.max_elevation_m);
    (meters / settings.gauge_m).clamp(-1.0, 1.0).asin()
}

/// Bank profile for every subsection of a chain.
///
/// `peak_for` returns the unsigned bank a curved subsection wants. Adjacent
/// curves bending the same way share their boundary roll so the chain has no
/// step in bank; a curve with straight track on both sides ramps up and back down.
pub fn plan_banking(sections: &[DtrackData], peak_for: impl Fn(&DtrackData) -> f32) -> Vec<BankProfile> {
    let roll = |section: &DtrackData| -section.param1.signum() * peak_for(section);
    let joins = |a: &DtrackData, b: &DtrackData| {
        a.is_curved && b.is_curved && a.param1.signum() == b.param1.signum()
    };

    sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            if !section.is_curved {
                return BankProfile::None;
            }
            let peak = roll(section);
            let start = match i.checked_sub(1).map(|p| &sections[p]) {
                Some(prev) if joins(prev, section) => (roll(prev) + peak) * 0.5,
                _ => 0.0,
            };
            let end = match sections.get(i + 1) {
                Some(next) if joins(section, next) => (peak + roll(next)) * 0.5,
                _ => 0.0,
            };
            BankProfile::classify(start, end, peak)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_ramp_up_example() {
        let profile = BankProfile::classify(0.0, 0.05, 0.05);
        assert_eq!(profile, BankProfile::RampUp { end: 0.05 });
        assert_eq!(profile.target_roll(0, 10), 0.0);
        assert!((profile.target_roll(2, 10) - 2.0 * (2.0 / 10.0) * 0.05).abs() < 1e-7);
        assert!((profile.target_roll(5, 10) - 0.05).abs() < 1e-7);
        assert!((profile.target_roll(9, 10) - 0.05).abs() < 1e-7);
    }

    #[test]
    fn test_ramp_down_and_up_down() {
        let down = BankProfile::RampDown { start: 0.04 };
        assert!((down.target_roll(0, 10) - 0.04).abs() < 1e-7);
        assert!((down.target_roll(5, 10) - 0.04).abs() < 1e-7);
        assert!((down.target_roll(8, 10) - 0.016).abs() < 1e-7);
        assert_eq!(down.target_roll(10, 10), 0.0);

        let isolated = BankProfile::classify(0.0, 0.0, 0.03);
        assert_eq!(isolated, BankProfile::RampUpDown { peak: 0.03 });
        assert_eq!(isolated.target_roll(0, 10), 0.0);
        assert!((isolated.target_roll(5, 10) - 0.03).abs() < 1e-7);
        assert_eq!(isolated.target_roll(10, 10), 0.0);
    }

    #[test]
    fn test_constant_interpolates() {
        let profile = BankProfile::classify(0.02, 0.04, 0.03);
        assert_eq!(profile, BankProfile::Constant { start: 0.02, end: 0.04 });
        assert!((profile.target_roll(5, 10) - 0.03).abs() < 1e-7);
        assert_eq!(BankProfile::classify(0.0, 0.0, 0.0), BankProfile::None);
    }

    #[test]
    fn test_bank_state_is_incremental() {
        let (state, delta) = BankState::LEVEL.step(0.01);
        assert_eq!(delta, 0.01);
        let (state, delta) = state.step(0.03);
        assert!((delta - 0.02).abs() < 1e-7);
        let (state, delta) = state.step(0.03);
        assert_eq!(delta, 0.0);
        assert_eq!(state.roll(), 0.03);
    }

    #[test]
    fn test_super_elevation_rounded_and_clamped() {
        let settings = ElevationSettings::default();
        // 1000 m at 20 m/s: D = 1.746, V = 44.74 mph, E = 2.446 in = 62.1 mm -> 60 mm.
        let angle = super_elevation_for(1000.0, 20.0, &settings);
        let elevation = angle.sin() * settings.gauge_m;
        assert!((elevation - 0.060).abs() < 1e-4, "elevation {elevation}");

        let fast = super_elevation_for(600.0, 44.7, &settings);
        assert!((fast.sin() * settings.gauge_m - 0.15).abs() < 1e-4);

        assert_eq!(super_elevation_for(50.0, 20.0, &settings), 0.0);
        let disabled = ElevationSettings {
            enabled: false,
            ..settings
        };
        assert_eq!(super_elevation_for(1000.0, 20.0, &disabled), 0.0);
    }

    #[test]
    fn test_plan_banking_chain() {
        let sections = [
            DtrackData::straight(20.0),
            DtrackData::curve(FRAC_PI_2 / 3.0, 500.0),
            DtrackData::curve(FRAC_PI_2 / 3.0, 500.0),
            DtrackData::curve(FRAC_PI_2 / 3.0, 500.0),
            DtrackData::straight(20.0),
            DtrackData::curve(-0.1, 800.0),
        ];
        let plan = plan_banking(&sections, |_| 0.05);
        assert_eq!(plan[0], BankProfile::None);
        assert_eq!(plan[1], BankProfile::RampUp { end: -0.05 });
        assert_eq!(plan[2], BankProfile::Constant { start: -0.05, end: -0.05 });
        assert_eq!(plan[3], BankProfile::RampDown { start: -0.05 });
        assert_eq!(plan[4], BankProfile::None);
        assert_eq!(plan[5], BankProfile::RampUpDown { peak: 0.05 });
    }
}
