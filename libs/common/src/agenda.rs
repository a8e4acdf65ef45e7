//! Agenda definitions and the advisory pace indicator.
//!
//! Agenda content is supplied by the caller as static configuration; the core
//! only uses section IDs and target durations.

use serde::{Deserialize, Serialize};

/// One agenda item with its configured target duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaSection {
    pub section_id: String,
    pub label: String,
    pub duration_minutes: u32,
}

/// Ordered agenda for one meeting type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agenda {
    pub sections: Vec<AgendaSection>,
}

impl Agenda {
    pub fn new(sections: Vec<AgendaSection>) -> Self {
        Self { sections }
    }

    /// Planned seconds through the given section, inclusive.
    ///
    /// `None` if the section is not on the agenda.
    pub fn planned_seconds_through(&self, section_id: &str) -> Option<i64> {
        let mut total: i64 = 0;
        for section in &self.sections {
            total += i64::from(section.duration_minutes) * 60;
            if section.section_id == section_id {
                return Some(total);
            }
        }
        None
    }

    pub fn section(&self, section_id: &str) -> Option<&AgendaSection> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }
}

/// Advisory classification of actual vs planned elapsed time. UI state only,
/// never replicated for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pace {
    Ahead,
    OnTrack,
    Behind,
    Critical,
}

/// Percentage-deviation thresholds: more than 20% behind is critical, more
/// than 10% behind is behind, more than 5% ahead is ahead.
pub fn classify_pace(elapsed_seconds: i64, planned_seconds: i64) -> Pace {
    if planned_seconds <= 0 {
        return Pace::OnTrack;
    }
    let deviation = (elapsed_seconds - planned_seconds) as f64 / planned_seconds as f64;
    if deviation > 0.20 {
        Pace::Critical
    } else if deviation > 0.10 {
        Pace::Behind
    } else if deviation < -0.05 {
        Pace::Ahead
    } else {
        Pace::OnTrack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agenda() -> Agenda {
        Agenda::new(vec![
            AgendaSection {
                section_id: "check-in".into(),
                label: "Check-In".into(),
                duration_minutes: 5,
            },
            AgendaSection {
                section_id: "priorities".into(),
                label: "Priorities".into(),
                duration_minutes: 10,
            },
            AgendaSection {
                section_id: "issues".into(),
                label: "Issues".into(),
                duration_minutes: 45,
            },
        ])
    }

    #[test]
    fn planned_seconds_accumulate_in_order() {
        let agenda = agenda();
        assert_eq!(agenda.planned_seconds_through("check-in"), Some(300));
        assert_eq!(agenda.planned_seconds_through("priorities"), Some(900));
        assert_eq!(agenda.planned_seconds_through("issues"), Some(3600));
        assert_eq!(agenda.planned_seconds_through("wrap-up"), None);
    }

    #[test]
    fn pace_thresholds() {
        // Planned 1000s.
        assert_eq!(classify_pace(1250, 1000), Pace::Critical); // 25% behind
        assert_eq!(classify_pace(1150, 1000), Pace::Behind); // 15% behind
        assert_eq!(classify_pace(1050, 1000), Pace::OnTrack); // 5% behind
        assert_eq!(classify_pace(1000, 1000), Pace::OnTrack);
        assert_eq!(classify_pace(960, 1000), Pace::OnTrack); // 4% ahead
        assert_eq!(classify_pace(900, 1000), Pace::Ahead); // 10% ahead
    }

    #[test]
    fn zero_plan_is_on_track() {
        assert_eq!(classify_pace(500, 0), Pace::OnTrack);
    }
}
