//! Load profiles: how many virtual users should be active over time.

use crate::duration::{format_duration, serde_str};
use crate::error::{LoadTestError, LoadTestResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One time-boxed segment of a load profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// How long the stage lasts
    #[serde(with = "serde_str")]
    pub duration: Duration,

    /// VU count reached at the end of the stage
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Ordered stages with linear interpolation of the VU count between boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProfile {
    /// VU count at the start of the first stage
    #[serde(default)]
    pub start_vus: u32,

    /// Stages executed in order
    pub stages: Vec<Stage>,
}

impl Default for LoadProfile {
    /// Ramp to 20 VUs, climb to 60, then drain to zero, one minute each.
    fn default() -> Self {
        Self {
            start_vus: 0,
            stages: vec![
                Stage::new(Duration::from_secs(60), 20),
                Stage::new(Duration::from_secs(60), 60),
                Stage::new(Duration::from_secs(60), 0),
            ],
        }
    }
}

impl LoadProfile {
    /// Hold a fixed VU count for the whole duration.
    pub fn constant(vus: u32, duration: Duration) -> Self {
        Self {
            start_vus: vus,
            stages: vec![Stage::new(duration, vus)],
        }
    }

    /// Sum of all stage durations, saturating at `Duration::MAX`
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    fn checked_total_duration(&self) -> Option<Duration> {
        self.stages
            .iter()
            .try_fold(Duration::ZERO, |acc, s| acc.checked_add(s.duration))
    }

    /// Targets in stage order
    pub fn targets(&self) -> Vec<u32> {
        self.stages.iter().map(|s| s.target).collect()
    }

    /// Highest VU count the profile ever asks for
    pub fn max_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }

    /// Get the VU target at a given time offset from run start.
    ///
    /// Each stage ramps linearly from the previous target (or `start_vus`)
    /// to its own. Zero-length stages jump; past the end the last target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = (f64::from(stage.target) - f64::from(from)) * progress;
                return (f64::from(from) + delta) as u32;
            }
            from = stage.target;
            stage_start = stage_end;
        }

        from
    }

    /// Index of the stage running at `elapsed`, `None` once the profile is over
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end = stage_end.saturating_add(stage.duration);
            if elapsed < stage_end {
                return Some(idx);
            }
        }
        None
    }

    /// Reject profiles the executor cannot run.
    pub fn validate(&self) -> LoadTestResult<()> {
        if self.stages.is_empty() {
            return Err(LoadTestError::InvalidProfile(
                "at least one stage is required".to_string(),
            ));
        }

        match self.checked_total_duration() {
            None => {
                return Err(LoadTestError::InvalidProfile(
                    "total duration overflows".to_string(),
                ))
            }
            Some(total) if total.is_zero() => {
                return Err(LoadTestError::InvalidProfile(
                    "total duration must be greater than zero".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.max_target() == 0 {
            return Err(LoadTestError::InvalidProfile(
                "profile never schedules a virtual user".to_string(),
            ));
        }

        Ok(())
    }

    /// Get description of this load profile
    pub fn description(&self) -> String {
        format!(
            "{} stage{}, {} total, peak {} VUs",
            self.stages.len(),
            if self.stages.len() == 1 { "" } else { "s" },
            format_duration(self.total_duration()),
            self.max_target()
        )
    }
}
