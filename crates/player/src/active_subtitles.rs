//! Subtitles that have started but not yet been flushed past.

use cadence_model::{DcpTime, PlayerSubtitles};
use std::collections::BTreeMap;

use crate::piece::PieceRef;

#[derive(Debug, Clone)]
struct Period {
    subtitles: PlayerSubtitles,
    from: DcpTime,
    to: Option<DcpTime>,
}

/// Per-piece list of subtitle periods, most recent last.
#[derive(Debug, Default)]
pub struct ActiveSubtitles {
    data: BTreeMap<PieceRef, Vec<Period>>,
}

impl ActiveSubtitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subtitle for `piece` starts at `from`; its end is not known yet.
    pub fn add_from(&mut self, piece: PieceRef, subtitles: PlayerSubtitles, from: DcpTime) {
        self.data.entry(piece).or_default().push(Period {
            subtitles,
            from,
            to: None,
        });
    }

    /// Close `piece`'s most recent subtitle at `to`; returns it with its start.
    pub fn add_to(&mut self, piece: PieceRef, to: DcpTime) -> Option<(PlayerSubtitles, DcpTime)> {
        let period = self.data.get_mut(&piece)?.last_mut()?;
        period.to = Some(to);
        for text in &mut period.subtitles.text {
            text.out_time = Some(to);
        }
        Some((period.subtitles.clone(), period.from))
    }

    pub fn have(&self, piece: PieceRef) -> bool {
        self.data.contains_key(&piece)
    }

    /// Subtitles showing at `time` from pieces for which `burn` holds.
    pub fn get_burnt(&self, time: DcpTime, burn: impl Fn(PieceRef) -> bool) -> Vec<PlayerSubtitles> {
        self.data
            .iter()
            .filter(|(piece, _)| burn(**piece))
            .flat_map(|(_, periods)| periods.iter())
            .filter(|p| p.from <= time && p.to.map_or(true, |to| to > time))
            .map(|p| p.subtitles.clone())
            .collect()
    }

    /// Forget periods that ended before `time`.
    pub fn clear_before(&mut self, time: DcpTime) {
        for periods in self.data.values_mut() {
            periods.retain(|p| p.to.map_or(true, |to| to >= time));
        }
        self.data.retain(|_, periods| !periods.is_empty());
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_model::TextSubtitle;

    fn piece(index: usize) -> PieceRef {
        PieceRef {
            generation: 1,
            index,
        }
    }

    fn text(s: &str) -> PlayerSubtitles {
        PlayerSubtitles {
            image: vec![],
            text: vec![TextSubtitle::new(s)],
        }
    }

    fn t(frames: i64) -> DcpTime {
        DcpTime::from_frames(frames, 24.0)
    }

    #[test]
    fn test_open_period_is_burnt() {
        let mut active = ActiveSubtitles::new();
        active.add_from(piece(0), text("hello"), t(5));
        assert!(active.get_burnt(t(4), |_| true).is_empty());
        assert_eq!(active.get_burnt(t(5), |_| true).len(), 1);
        assert_eq!(active.get_burnt(t(500), |_| true).len(), 1);
    }

    #[test]
    fn test_closed_period_stops_and_stamps_out_time() {
        let mut active = ActiveSubtitles::new();
        active.add_from(piece(0), text("hello"), t(5));
        let (subs, from) = active.add_to(piece(0), t(10)).unwrap();
        assert_eq!(from, t(5));
        assert_eq!(subs.text[0].out_time, Some(t(10)));
        assert_eq!(active.get_burnt(t(9), |_| true).len(), 1);
        assert!(active.get_burnt(t(10), |_| true).is_empty());
    }

    #[test]
    fn test_burn_filter_per_piece() {
        let mut active = ActiveSubtitles::new();
        active.add_from(piece(0), text("a"), t(0));
        active.add_from(piece(1), text("b"), t(0));
        let burnt = active.get_burnt(t(1), |p| p.index == 1);
        assert_eq!(burnt.len(), 1);
        assert_eq!(burnt[0].text[0].text, "b");
    }

    #[test]
    fn test_clear_before_drops_finished() {
        let mut active = ActiveSubtitles::new();
        active.add_from(piece(0), text("a"), t(0));
        active.add_to(piece(0), t(2));
        active.add_from(piece(0), text("b"), t(3));
        active.clear_before(t(3));
        assert!(active.have(piece(0)));
        assert_eq!(active.get_burnt(t(3), |_| true)[0].text[0].text, "b");
        active.add_to(piece(0), t(4));
        active.clear_before(t(5));
        assert!(!active.have(piece(0)));
    }

    #[test]
    fn test_add_to_unknown_piece() {
        let mut active = ActiveSubtitles::new();
        assert!(active.add_to(piece(3), t(1)).is_none());
    }
}
