//! Fixed-point time in two domains.
//!
//! Every timestamp is a signed tick count at [`HZ`] ticks per second. A
//! [`ContentTime`] is measured inside one piece of content; a [`DcpTime`] is
//! measured on the output timeline. The domain is part of the type, so mixing
//! them needs an explicit conversion through a [`FrameRateChange`].
//!
//! ```text
//!   content:  |--trim_start--|=========== used ===========|--trim_end--|
//!   output:                  ^ position
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::frame_rate::FrameRateChange;

/// Ticks per second.
pub const HZ: i64 = 96_000;

/// An integer frame (or sample) count. Which rate it is counted at is named
/// by the function that produced it.
pub type Frame = i64;

/// Marker for time measured inside a piece of content.
#[derive(Debug)]
pub enum ContentDomain {}

/// Marker for time measured on the output timeline.
#[derive(Debug)]
pub enum DcpDomain {}

/// A tick count tagged with its domain.
pub struct Time<D> {
    ticks: i64,
    _domain: PhantomData<D>,
}

pub type ContentTime = Time<ContentDomain>;
pub type DcpTime = Time<DcpDomain>;

impl<D> Time<D> {
    pub const fn new(ticks: i64) -> Self {
        Self {
            ticks,
            _domain: PhantomData,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0)
    }

    /// The largest representable time, used as "no limit".
    pub const fn max_value() -> Self {
        Self::new(i64::MAX)
    }

    pub const fn ticks(self) -> i64 {
        self.ticks
    }

    pub fn from_seconds(seconds: f64) -> Self {
        Self::new((seconds * HZ as f64).round() as i64)
    }

    pub fn seconds(self) -> f64 {
        self.ticks as f64 / HZ as f64
    }

    /// Time of frame `frame` at `rate` frames per second.
    pub fn from_frames(frame: Frame, rate: f64) -> Self {
        debug_assert!(rate > 0.0);
        Self::new((frame as f64 * HZ as f64 / rate).round() as i64)
    }

    /// Nearest frame index at `rate`.
    pub fn frames_round(self, rate: f64) -> Frame {
        (self.ticks as f64 * rate / HZ as f64).round() as Frame
    }

    /// Index of the frame containing this time at `rate`.
    pub fn frames_floor(self, rate: f64) -> Frame {
        (self.ticks as f64 * rate / HZ as f64).floor() as Frame
    }

    /// Round up to the next whole frame at `rate`.
    pub fn ceil(self, rate: f64) -> Self {
        let frames = (self.ticks as f64 * rate / HZ as f64).ceil() as Frame;
        Self::from_frames(frames, rate)
    }

    pub fn is_negative(self) -> bool {
        self.ticks < 0
    }

    /// This time, or zero if it is negative.
    pub fn clamp_non_negative(self) -> Self {
        Self::new(self.ticks.max(0))
    }
}

impl DcpTime {
    /// Convert content time to output time, applying any speed change.
    pub fn from_content(time: ContentTime, frc: &FrameRateChange) -> Self {
        Self::new((time.ticks as f64 / frc.speed_up).round() as i64)
    }
}

impl ContentTime {
    /// Convert output time to content time, applying any speed change.
    pub fn from_dcp(time: DcpTime, frc: &FrameRateChange) -> Self {
        Self::new((time.ticks as f64 * frc.speed_up).round() as i64)
    }
}

// Manual impls: derives would demand the marker types implement the traits.

impl<D> Clone for Time<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Time<D> {}

impl<D> Default for Time<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<D> PartialEq for Time<D> {
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks
    }
}

impl<D> Eq for Time<D> {}

impl<D> PartialOrd for Time<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D> Ord for Time<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks.cmp(&other.ticks)
    }
}

impl<D> Hash for Time<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ticks.hash(state);
    }
}

impl<D> fmt::Debug for Time<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.ticks)
    }
}

impl<D> fmt::Display for Time<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.seconds())
    }
}

impl<D> Add for Time<D> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.ticks + rhs.ticks)
    }
}

impl<D> Sub for Time<D> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.ticks - rhs.ticks)
    }
}

impl<D> AddAssign for Time<D> {
    fn add_assign(&mut self, rhs: Self) {
        self.ticks += rhs.ticks;
    }
}

impl<D> SubAssign for Time<D> {
    fn sub_assign(&mut self, rhs: Self) {
        self.ticks -= rhs.ticks;
    }
}

impl<D> Neg for Time<D> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.ticks)
    }
}

impl<D> Serialize for Time<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.ticks)
    }
}

impl<'de, D> Deserialize<'de> for Time<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        i64::deserialize(deserializer).map(Self::new)
    }
}

/// Half-open span `[from, to)` in one domain.
pub struct TimePeriod<D> {
    pub from: Time<D>,
    pub to: Time<D>,
}

impl<D> Clone for TimePeriod<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for TimePeriod<D> {}

impl<D> PartialEq for TimePeriod<D> {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl<D> Eq for TimePeriod<D> {}

impl<D> fmt::Debug for TimePeriod<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, {:?})", self.from, self.to)
    }
}

pub type DcpTimePeriod = TimePeriod<DcpDomain>;
pub type ContentTimePeriod = TimePeriod<ContentDomain>;

impl<D> TimePeriod<D> {
    pub fn new(from: Time<D>, to: Time<D>) -> Self {
        Self { from, to }
    }

    pub fn duration(&self) -> Time<D> {
        self.to - self.from
    }

    pub fn contains(&self, time: Time<D>) -> bool {
        self.from <= time && time < self.to
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    pub fn overlap(&self, other: &Self) -> Option<Self> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from < to).then(|| Self::new(from, to))
    }
}

/// Sort and merge touching or overlapping periods.
pub fn coalesce<D>(mut periods: Vec<TimePeriod<D>>) -> Vec<TimePeriod<D>> {
    periods.retain(|p| !p.is_empty());
    periods.sort_by_key(|p| p.from);
    let mut out: Vec<TimePeriod<D>> = Vec::with_capacity(periods.len());
    for period in periods {
        match out.last_mut() {
            Some(last) if period.from <= last.to => last.to = last.to.max(period.to),
            _ => out.push(period),
        }
    }
    out
}

/// The parts of `period` not covered by any of `remove`.
pub fn subtract<D>(period: TimePeriod<D>, remove: &[TimePeriod<D>]) -> Vec<TimePeriod<D>> {
    let mut out = Vec::new();
    let mut cursor = period.from;
    for hole in coalesce(remove.to_vec()) {
        if hole.to <= cursor {
            continue;
        }
        if hole.from >= period.to {
            break;
        }
        if hole.from > cursor {
            out.push(TimePeriod::new(cursor, hole.from));
        }
        cursor = cursor.max(hole.to);
    }
    if cursor < period.to {
        out.push(TimePeriod::new(cursor, period.to));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dcp(frames: Frame) -> DcpTime {
        DcpTime::from_frames(frames, 24.0)
    }

    #[test]
    fn test_one_second() {
        assert_eq!(DcpTime::from_seconds(1.0).ticks(), HZ);
        assert_eq!(DcpTime::from_frames(24, 24.0).ticks(), HZ);
    }

    #[test]
    fn test_frames_floor_vs_round() {
        let t = DcpTime::new(HZ / 24 * 3 + HZ / 24 * 3 / 4);
        assert_eq!(t.frames_floor(24.0), 3);
        assert_eq!(t.frames_round(24.0), 4);
    }

    #[test]
    fn test_ceil_to_frame() {
        let t = DcpTime::new(HZ / 24 + 1);
        assert_eq!(t.ceil(24.0), dcp(2));
        assert_eq!(dcp(2).ceil(24.0), dcp(2));
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!((dcp(1) - dcp(3)).clamp_non_negative(), DcpTime::zero());
        assert_eq!(dcp(3).clamp_non_negative(), dcp(3));
    }

    #[test]
    fn test_speed_change_conversion() {
        // 25fps content played at 24fps: content runs slower on the output
        let frc = FrameRateChange::new(25.0, 24);
        let one_second_content = ContentTime::from_seconds(1.0);
        let out = DcpTime::from_content(one_second_content, &frc);
        assert!((out.seconds() - 25.0 / 24.0).abs() < 1e-4);
        let back = ContentTime::from_dcp(out, &frc);
        assert!((back - one_second_content).ticks().abs() <= 1);
    }

    #[test]
    fn test_subtract_leaves_gaps() {
        let whole = TimePeriod::new(dcp(0), dcp(20));
        let gaps = subtract(
            whole,
            &[
                TimePeriod::new(dcp(2), dcp(5)),
                TimePeriod::new(dcp(4), dcp(8)),
                TimePeriod::new(dcp(15), dcp(30)),
            ],
        );
        assert_eq!(
            gaps,
            vec![
                TimePeriod::new(dcp(0), dcp(2)),
                TimePeriod::new(dcp(8), dcp(15))
            ]
        );
    }

    #[test]
    fn test_subtract_nothing_removed() {
        let whole = TimePeriod::new(dcp(0), dcp(10));
        assert_eq!(subtract(whole, &[]), vec![whole]);
    }

    #[test]
    fn test_overlap() {
        let a = TimePeriod::new(dcp(0), dcp(10));
        let b = TimePeriod::new(dcp(5), dcp(15));
        assert_eq!(a.overlap(&b), Some(TimePeriod::new(dcp(5), dcp(10))));
        assert_eq!(a.overlap(&TimePeriod::new(dcp(10), dcp(12))), None);
    }

    proptest! {
        #[test]
        fn prop_frames_roundtrip(frame in -1_000_000i64..1_000_000, rate in prop::sample::select(vec![23.976, 24.0, 25.0, 29.97, 30.0, 48.0, 48000.0, 44100.0])) {
            let t = ContentTime::from_frames(frame, rate);
            prop_assert_eq!(t.frames_round(rate), frame);
        }

        #[test]
        fn prop_floor_never_exceeds_round(ticks in -10_000_000i64..10_000_000) {
            let t = DcpTime::new(ticks);
            prop_assert!(t.frames_floor(24.0) <= t.frames_round(24.0));
        }

        #[test]
        fn prop_subtract_disjoint_from_removed(a in 0i64..100, b in 0i64..100) {
            let whole = TimePeriod::new(dcp(0), dcp(100));
            let hole = TimePeriod::new(dcp(a.min(b)), dcp(a.max(b)));
            for gap in subtract(whole, &[hole]) {
                prop_assert!(gap.overlap(&hole).is_none());
                prop_assert!(!gap.is_empty());
            }
        }
    }
}
