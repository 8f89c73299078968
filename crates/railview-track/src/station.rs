//! How many stations a subsection is cut into.

use crate::dtrack::DtrackData;

/// Upper bound on intervals per subsection.
const MAX_INTERVALS: u32 = 1024;

/// Smallest chord span honoured, in radians.
const MIN_CHORD_SPAN: f32 = 1.0e-4;

/// Slack so an angle that is an exact multiple of the span is not rounded up.
const CEIL_SLACK: f32 = 1.0e-4;

/// Refinement applied to curved subsections after the chord-span split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PitchControl {
    #[default]
    None,
    /// Keep the straight distance between stations under the limit.
    ChordLength,
    /// Keep the gap between chord midpoint and arc under the limit.
    ChordDisplacement,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StationSettings {
    /// Target arc angle between stations on curves, radians.
    pub chord_span: f32,
    pub pitch_control: PitchControl,
    /// Limit for the pitch-control heuristic, meters.
    pub pitch_control_scalar: f32,
    /// Intervals used for straight track.
    pub straight_intervals: u32,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            chord_span: 1f32.to_radians(),
            pitch_control: PitchControl::None,
            pitch_control_scalar: 1.0,
            straight_intervals: 1,
        }
    }
}

/// Number of intervals for track geometry. The ribbon has one more ring than this.
pub fn station_count(section: &DtrackData, settings: &StationSettings) -> u32 {
    if !section.is_curved {
        return settings.straight_intervals.clamp(1, MAX_INTERVALS);
    }

    let angle = section.param1.abs();
    let radius = section.param2;
    let by_span = (angle / settings.chord_span.max(MIN_CHORD_SPAN) - CEIL_SLACK).ceil();
    let limit = settings.pitch_control_scalar;

    let max_step = match settings.pitch_control {
        PitchControl::ChordLength if limit > 0.0 && limit < 2.0 * radius => {
            Some(2.0 * (limit / (2.0 * radius)).asin())
        }
        PitchControl::ChordDisplacement if limit > 0.0 && limit < radius => {
            Some(2.0 * (1.0 - limit / radius).acos())
        }
        _ => None,
    };
    let refined = max_step
        .filter(|step| *step > 0.0)
        .map_or(by_span, |step| by_span.max((angle / step - CEIL_SLACK).ceil()));

    (refined as u32).clamp(1, MAX_INTERVALS)
}

/// Number of intervals for overhead wire.
///
/// Straight wire is cut every `segment_length` meters, rounded and forced
/// even so droppers land on alternate stations. Curves follow the track rule.
pub fn wire_station_count(section: &DtrackData, settings: &StationSettings, segment_length: f32) -> u32 {
    if section.is_curved {
        return station_count(section, settings);
    }
    let n = (section.length() / segment_length.max(0.1)).round().max(1.0) as u32;
    let n = if n % 2 == 1 { n + 1 } else { n };
    n.min(MAX_INTERVALS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_straight_uses_fixed_count() {
        let settings = StationSettings::default();
        assert_eq!(station_count(&DtrackData::straight(500.0), &settings), 1);
    }

    #[test]
    fn test_curve_split_by_chord_span() {
        let settings = StationSettings::default();
        assert_eq!(station_count(&DtrackData::curve(FRAC_PI_2, 600.0), &settings), 90);
        assert_eq!(station_count(&DtrackData::curve(-FRAC_PI_2, 600.0), &settings), 90);
    }

    #[test]
    fn test_chord_length_refines() {
        let settings = StationSettings {
            pitch_control: PitchControl::ChordLength,
            pitch_control_scalar: 5.0,
            ..StationSettings::default()
        };
        let n = station_count(&DtrackData::curve(FRAC_PI_2, 600.0), &settings);
        assert!(n > 90);
        let step = FRAC_PI_2 / n as f32;
        let chord = 2.0 * 600.0 * (step / 2.0).sin();
        assert!(chord <= 5.0 + 1e-3, "chord {chord}");
    }

    #[test]
    fn test_chord_displacement_refines() {
        let settings = StationSettings {
            pitch_control: PitchControl::ChordDisplacement,
            pitch_control_scalar: 0.01,
            ..StationSettings::default()
        };
        let n = station_count(&DtrackData::curve(FRAC_PI_2, 600.0), &settings);
        let step = FRAC_PI_2 / n as f32;
        let sagitta = 600.0 * (1.0 - (step / 2.0).cos());
        assert!(n > 90);
        assert!(sagitta <= 0.01 + 1e-4, "sagitta {sagitta}");
    }

    #[test]
    fn test_wire_count_forced_even() {
        let settings = StationSettings::default();
        assert_eq!(wire_station_count(&DtrackData::straight(40.0), &settings, 10.0), 4);
        assert_eq!(wire_station_count(&DtrackData::straight(25.0), &settings, 10.0), 4);
        assert_eq!(wire_station_count(&DtrackData::straight(10.0), &settings, 10.0), 2);
        assert_eq!(wire_station_count(&DtrackData::straight(1.0), &settings, 10.0), 2);
    }
}
