//! Status evaluation: elapsed age plus thresholds in, aging stage out.
//!
//! Nothing here is cached. Settings can change between cycles, so callers
//! re-derive status for every tab on every cycle.

use chrono::{DateTime, Utc};

use crate::models::{TabStatus, TrackedTab};
use crate::settings::{StageToggles, Thresholds, TimeMode};

/// Highest stage whose threshold `age_ms` has reached, capped below the first
/// disabled stage.
pub fn evaluate(age_ms: u64, thresholds: &Thresholds, stages: &StageToggles) -> TabStatus {
    let ladder = [
        (TabStatus::Yellow, thresholds.yellow_after_ms, stages.yellow),
        (TabStatus::Red, thresholds.red_after_ms, stages.red),
        (TabStatus::Gone, thresholds.gone_after_ms, stages.gone),
    ];

    let mut status = TabStatus::Green;
    for (stage, threshold_ms, enabled) in ladder {
        if !enabled || age_ms < threshold_ms {
            break;
        }
        status = stage;
    }
    status
}

/// Age of a tab measured with the anchor the time mode selects.
pub fn tab_age_ms(
    tab: &TrackedTab,
    mode: TimeMode,
    active_total_ms: u64,
    now: DateTime<Utc>,
) -> u64 {
    match mode {
        TimeMode::ActiveTime => active_total_ms.saturating_sub(tab.active_anchor_ms),
        TimeMode::WallClock => (now - tab.wall_anchor).num_milliseconds().max(0) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const HOUR: u64 = 60 * 60 * 1000;

    fn thresholds() -> Thresholds {
        Thresholds {
            yellow_after_ms: 4 * HOUR,
            red_after_ms: 8 * HOUR,
            gone_after_ms: 24 * HOUR,
        }
    }

    #[test]
    fn five_hours_active_is_yellow() {
        assert_eq!(
            evaluate(5 * HOUR, &thresholds(), &StageToggles::default()),
            TabStatus::Yellow
        );
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = thresholds();
        let all = StageToggles::default();
        assert_eq!(evaluate(4 * HOUR - 1, &t, &all), TabStatus::Green);
        assert_eq!(evaluate(4 * HOUR, &t, &all), TabStatus::Yellow);
        assert_eq!(evaluate(8 * HOUR, &t, &all), TabStatus::Red);
        assert_eq!(evaluate(24 * HOUR, &t, &all), TabStatus::Gone);
    }

    #[test]
    fn monotonic_in_age() {
        let t = thresholds();
        let toggles = [
            StageToggles::default(),
            StageToggles { yellow: true, red: false, gone: true },
            StageToggles { yellow: true, red: true, gone: false },
            StageToggles { yellow: false, red: true, gone: true },
        ];
        for stages in toggles {
            let mut previous = TabStatus::Green;
            for hour in 0..48 {
                let status = evaluate(hour * HOUR, &t, &stages);
                assert!(status >= previous, "status regressed at {hour}h");
                previous = status;
            }
        }
    }

    #[test]
    fn disabled_stage_caps_progression() {
        let t = thresholds();
        let no_gone = StageToggles { yellow: true, red: true, gone: false };
        assert_eq!(evaluate(100 * HOUR, &t, &no_gone), TabStatus::Red);

        let no_red = StageToggles { yellow: true, red: false, gone: true };
        assert_eq!(evaluate(100 * HOUR, &t, &no_red), TabStatus::Yellow);

        let no_yellow = StageToggles { yellow: false, red: true, gone: true };
        assert_eq!(evaluate(100 * HOUR, &t, &no_yellow), TabStatus::Green);
    }

    #[test]
    fn age_follows_time_mode() {
        let now = Utc::now();
        let tab = TrackedTab::new(1, 1, "https://a.test", "A", 1_000, now - Duration::hours(2));

        assert_eq!(tab_age_ms(&tab, TimeMode::ActiveTime, 61_000, now), 60_000);
        assert_eq!(tab_age_ms(&tab, TimeMode::WallClock, 61_000, now), 2 * HOUR);
        assert_eq!(tab_age_ms(&tab, TimeMode::ActiveTime, 500, now), 0);
    }
}
