use crate::domain::FrameEvent;
use std::collections::VecDeque;

/// How the per-frame duration used for the estimate is derived.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Smoothing {
    /// Time for the next frame is assumed equal to the time for the last one.
    LastFrame,
    /// Mean of the last `n` observed frame durations.
    Window(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EstimatorOptions {
    pub smoothing: Smoothing,
    /// Clamp remaining frames at zero once frames run past the configured end.
    pub clamp_overshoot: bool,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::LastFrame,
            clamp_overshoot: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressState {
    pub last_frame_time: Option<String>,
    pub estimated_time_left: Option<f64>,
    recent_durations: VecDeque<f64>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressEstimator {
    options: EstimatorOptions,
}

impl ProgressEstimator {
    pub fn new(options: EstimatorOptions) -> Self {
        Self { options }
    }

    /// Folds one frame event into the progress state.
    ///
    /// The estimate always pairs the previous event's elapsed label with the
    /// current event's frame number. The first event of a session only records
    /// its label. `end_frame` of `None` or `0` means "no configured end", in
    /// which case the current frame is treated as the last one.
    pub fn on_frame_event(
        &self,
        state: &ProgressState,
        event: &FrameEvent,
        end_frame: Option<i64>,
    ) -> ProgressState {
        let mut next = state.clone();
        next.last_frame_time = Some(event.time.clone());

        let Some(previous_label) = state.last_frame_time.as_deref() else {
            return next;
        };

        let taken = parse_elapsed(Some(previous_label));
        let per_frame = match self.options.smoothing {
            Smoothing::LastFrame => taken,
            Smoothing::Window(size) => {
                let size = size.max(1);
                next.recent_durations.push_back(taken);
                while next.recent_durations.len() > size {
                    next.recent_durations.pop_front();
                }
                let total: f64 = next.recent_durations.iter().sum();
                total / next.recent_durations.len() as f64
            }
        };

        let target = end_frame.filter(|end| *end != 0).unwrap_or(event.frame);
        let mut remaining = target.saturating_sub(event.frame);
        if self.options.clamp_overshoot {
            remaining = remaining.max(0);
        }

        next.estimated_time_left = Some(remaining as f64 * per_frame);
        next
    }
}

/// Parses an elapsed label of the form `MM:SS.ss` into seconds.
///
/// Anything that does not have that shape counts as zero elapsed time.
pub fn parse_elapsed(label: Option<&str>) -> f64 {
    let Some(label) = label else {
        return 0.0;
    };
    let Some((minutes, seconds)) = label.split_once(':') else {
        return 0.0;
    };
    let Ok(minutes) = minutes.trim().parse::<i64>() else {
        return 0.0;
    };
    let Ok(seconds) = seconds.trim().parse::<f64>() else {
        return 0.0;
    };

    let total = minutes as f64 * 60.0 + seconds;
    if total.is_finite() { total } else { 0.0 }
}

pub fn format_eta(estimate: Option<f64>) -> String {
    match estimate {
        None => "Calculating...".to_string(),
        Some(seconds) if seconds.is_finite() && seconds >= 60.0 => {
            format!("{seconds:.2} seconds ({})", format_hms(seconds))
        }
        Some(seconds) => format!("{seconds:.2} seconds"),
    }
}

fn format_hms(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else {
        format!("{minutes}m {secs:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame: i64, time: &str) -> FrameEvent {
        FrameEvent {
            frame,
            time: time.to_string(),
        }
    }

    #[test]
    fn parse_elapsed_reads_minutes_and_fractional_seconds() {
        assert!((parse_elapsed(Some("00:08.89")) - 8.89).abs() < 1e-9);
        assert!((parse_elapsed(Some("01:00.00")) - 60.0).abs() < 1e-9);
        assert!((parse_elapsed(Some("02:30.5")) - 150.5).abs() < 1e-9);
    }

    #[test]
    fn parse_elapsed_degrades_to_zero() {
        assert_eq!(parse_elapsed(Some("")), 0.0);
        assert_eq!(parse_elapsed(None), 0.0);
        assert_eq!(parse_elapsed(Some("garbage")), 0.0);
        assert_eq!(parse_elapsed(Some("ab:01.00")), 0.0);
        assert_eq!(parse_elapsed(Some("01:xx")), 0.0);
        assert_eq!(parse_elapsed(Some("01:02:03.45")), 0.0);
        assert_eq!(parse_elapsed(Some("00:inf")), 0.0);
    }

    #[test]
    fn first_event_only_sets_the_baseline() {
        let estimator = ProgressEstimator::default();
        let next = estimator.on_frame_event(&ProgressState::new(), &event(10, "00:08.89"), Some(300));
        assert_eq!(next.last_frame_time.as_deref(), Some("00:08.89"));
        assert_eq!(next.estimated_time_left, None);
    }

    #[test]
    fn estimate_uses_previous_label_and_current_frame() {
        let estimator = ProgressEstimator::default();
        let state = estimator.on_frame_event(&ProgressState::new(), &event(10, "00:08.89"), Some(300));
        let next = estimator.on_frame_event(&state, &event(11, "00:09.10"), Some(300));

        let estimate = next.estimated_time_left.expect("estimate");
        assert!((estimate - 289.0 * 8.89).abs() < 1e-6);
        assert_eq!(next.last_frame_time.as_deref(), Some("00:09.10"));
    }

    #[test]
    fn repeated_and_decreasing_frames_are_accepted() {
        let estimator = ProgressEstimator::default();
        let mut state = ProgressState::new();
        for (frame, time) in [(20, "00:02.00"), (20, "00:03.00"), (15, "00:04.00")] {
            state = estimator.on_frame_event(&state, &event(frame, time), Some(30));
        }
        let estimate = state.estimated_time_left.expect("estimate");
        assert!((estimate - 15.0 * 3.0).abs() < 1e-9);
    }

    #[test]
    fn overshoot_is_clamped_by_default() {
        let estimator = ProgressEstimator::default();
        let state = estimator.on_frame_event(&ProgressState::new(), &event(301, "00:05.00"), Some(300));
        let next = estimator.on_frame_event(&state, &event(305, "00:05.00"), Some(300));
        assert_eq!(next.estimated_time_left, Some(0.0));
    }

    #[test]
    fn raw_mode_keeps_negative_estimates() {
        let estimator = ProgressEstimator::new(EstimatorOptions {
            smoothing: Smoothing::LastFrame,
            clamp_overshoot: false,
        });
        let state = estimator.on_frame_event(&ProgressState::new(), &event(301, "00:05.00"), Some(300));
        let next = estimator.on_frame_event(&state, &event(305, "00:05.00"), Some(300));
        assert_eq!(next.estimated_time_left, Some(-25.0));
    }

    #[test]
    fn missing_end_frame_means_nothing_left() {
        let estimator = ProgressEstimator::default();
        let state = estimator.on_frame_event(&ProgressState::new(), &event(1, "00:05.00"), None);
        let next = estimator.on_frame_event(&state, &event(2, "00:05.00"), Some(0));
        assert_eq!(next.estimated_time_left, Some(0.0));
    }

    #[test]
    fn malformed_previous_label_yields_zero_estimate() {
        let estimator = ProgressEstimator::default();
        let state = estimator.on_frame_event(&ProgressState::new(), &event(1, "soon"), Some(100));
        let next = estimator.on_frame_event(&state, &event(2, "00:01.00"), Some(100));
        assert_eq!(next.estimated_time_left, Some(0.0));
    }

    #[test]
    fn window_smoothing_averages_recent_durations() {
        let estimator = ProgressEstimator::new(EstimatorOptions {
            smoothing: Smoothing::Window(2),
            clamp_overshoot: true,
        });
        let mut state = ProgressState::new();
        for (frame, time) in [(1, "00:02.00"), (2, "00:04.00"), (3, "00:08.00"), (4, "00:01.00")] {
            state = estimator.on_frame_event(&state, &event(frame, time), Some(10));
        }
        // Window holds the durations of frames 2 and 3.
        let estimate = state.estimated_time_left.expect("estimate");
        assert!((estimate - 6.0 * 6.0).abs() < 1e-9);
    }

    #[test]
    fn format_eta_handles_pending_short_and_long_estimates() {
        assert_eq!(format_eta(None), "Calculating...");
        assert_eq!(format_eta(Some(12.5)), "12.50 seconds");
        assert_eq!(format_eta(Some(2568.21)), "2568.21 seconds (42m 48s)");
        assert_eq!(format_eta(Some(3725.0)), "3725.00 seconds (1h 02m 05s)");
        assert_eq!(format_eta(Some(-25.0)), "-25.00 seconds");
    }
}
