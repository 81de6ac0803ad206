//! Stretches of the output timeline with no content of some kind.

use cadence_model::{subtract, Content, DcpTime, DcpTimePeriod};

/// Tracks the uncovered spans for one kind of data (video or audio) and a
/// cursor the player advances as it fills them with black or silence.
#[derive(Debug, Clone, Default)]
pub struct Empty {
    periods: Vec<DcpTimePeriod>,
    position: DcpTime,
}

impl Empty {
    /// Spans of `[0, length)` not covered by any of `covered` for which `part`
    /// holds. Only content that will actually be decoded belongs in `covered`.
    pub fn new<'a>(
        covered: impl IntoIterator<Item = &'a Content>,
        length: DcpTime,
        video_frame_rate: u32,
        part: impl Fn(&Content) -> bool,
    ) -> Self {
        let full: Vec<DcpTimePeriod> = covered
            .into_iter()
            .filter(|c| part(c))
            .map(|c| DcpTimePeriod::new(c.position, c.end(&c.frame_rate_change(video_frame_rate))))
            .collect();
        let periods = subtract(DcpTimePeriod::new(DcpTime::zero(), length), &full);
        let position = periods.first().map(|p| p.from).unwrap_or_default();
        Self { periods, position }
    }

    pub fn position(&self) -> DcpTime {
        self.position
    }

    pub fn periods(&self) -> &[DcpTimePeriod] {
        &self.periods
    }

    /// Move the cursor to `position`, or to the start of the next span after it.
    pub fn set_position(&mut self, position: DcpTime) {
        self.position = position;
        if self.periods.iter().any(|p| p.contains(position)) {
            return;
        }
        if let Some(next) = self.periods.iter().find(|p| p.from > position) {
            self.position = next.from;
        }
    }

    /// From the cursor to the end of the span containing it.
    pub fn period_at_position(&self) -> Option<DcpTimePeriod> {
        self.periods
            .iter()
            .find(|p| p.contains(self.position))
            .map(|p| DcpTimePeriod::new(self.position, p.to))
    }

    pub fn done(&self) -> bool {
        let latest = self.periods.iter().map(|p| p.to).max().unwrap_or_default();
        self.position >= latest
    }
}
