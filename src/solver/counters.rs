//! Performance and diagnostic counters.
//!
//! The solver keeps two copies of [`StepCounters`]: one accumulated since
//! initialization and never reset, and one reset by every `restart()`.

use std::time::Duration;

/// Event counts accumulated over major steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepCounters {
    pub major_step_count: u64,
    pub minor_step_count: u64,
    pub decomposition_count: u64,
    pub decomposition_fail_count: u64,
    pub convergence_fail_count: u64,
    pub link_reset_step_fail_count: u64,
    /// Minor steps rolled back because a link rejected the solution
    pub rejected_step_count: u64,
    /// Most minor steps taken by any single major step
    pub max_minor_steps: u32,
}

impl StepCounters {
    /// Average minor steps per major step.
    pub fn avg_minor_steps(&self) -> f64 {
        if self.major_step_count == 0 {
            0.0
        } else {
            self.minor_step_count as f64 / self.major_step_count as f64
        }
    }
}

/// Timing of the last major step and the worst seen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    /// Time spent decomposing and solving in the last major step
    pub solve_time: Duration,
    /// Wall time of the last major step
    pub step_time: Duration,
    pub max_solve_time: Duration,
    pub max_step_time: Duration,
}

impl Timing {
    pub(crate) fn record(&mut self, solve_time: Duration, step_time: Duration) {
        self.solve_time = solve_time;
        self.step_time = step_time;
        self.max_solve_time = self.max_solve_time.max(solve_time);
        self.max_step_time = self.max_step_time.max(step_time);
    }
}

/// Counters since initialization and since the last restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceCounters {
    pub since_init: StepCounters,
    pub since_restart: StepCounters,
    pub timing: Timing,
}

impl PerformanceCounters {
    /// Apply `f` to both counter sets.
    pub(crate) fn update(&mut self, mut f: impl FnMut(&mut StepCounters)) {
        f(&mut self.since_init);
        f(&mut self.since_restart);
    }

    pub(crate) fn restart(&mut self) {
        self.since_restart = StepCounters::default();
        self.timing = Timing::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_keeps_since_init() {
        let mut counters = PerformanceCounters::default();
        counters.update(|c| {
            c.major_step_count += 2;
            c.minor_step_count += 5;
        });
        counters.restart();

        assert_eq!(counters.since_init.major_step_count, 2);
        assert_eq!(counters.since_restart.major_step_count, 0);
        assert_eq!(counters.since_init.avg_minor_steps(), 2.5);
        assert_eq!(counters.since_restart.avg_minor_steps(), 0.0);
    }
}
