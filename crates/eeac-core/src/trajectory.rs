//! Per-generator rotor angle and speed trajectories.
//!
//! Trajectories start as a single pre-fault sample holding the snapshot's
//! initial angles. The generator trajectory calculator replaces them with a
//! time-ordered sequence spanning the during- and post-fault regimes.

use serde::{Deserialize, Serialize};

use crate::error::{EeacError, EeacResult};
use crate::network::{NetworkRegime, NetworkSnapshot};
use crate::GeneratorId;

/// State of every generator at one observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Time since fault inception (s)
    pub time: f64,
    /// Regime the network is in from this time on
    pub regime: NetworkRegime,
    /// Rotor angles (rad), indexed by generator
    pub angles: Vec<f64>,
    /// Angular speed deviations (pu), indexed by generator
    pub speeds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorTrajectories {
    samples: Vec<TrajectorySample>,
}

impl GeneratorTrajectories {
    /// Single pre-fault sample at t = 0 with zero speed deviation.
    pub fn initial(snapshot: &NetworkSnapshot) -> Self {
        Self {
            samples: vec![TrajectorySample {
                time: 0.0,
                regime: NetworkRegime::PreFault,
                angles: snapshot.initial_angles(),
                speeds: vec![0.0; snapshot.len()],
            }],
        }
    }

    /// Build from explicit samples, checking ordering and sizes.
    pub fn from_samples(samples: Vec<TrajectorySample>) -> EeacResult<Self> {
        let first = samples
            .first()
            .ok_or_else(|| EeacError::Config("trajectories need at least one sample".into()))?;
        if first.time != 0.0 || first.regime != NetworkRegime::PreFault {
            return Err(EeacError::Config(
                "first trajectory sample must be the pre-fault state at t = 0".into(),
            ));
        }
        let n = first.angles.len();
        for pair in samples.windows(2) {
            if !(pair[1].time > pair[0].time) {
                return Err(EeacError::Config(format!(
                    "trajectory times must be strictly increasing ({} then {})",
                    pair[0].time, pair[1].time
                )));
            }
        }
        if samples.iter().any(|s| s.angles.len() != n || s.speeds.len() != n) {
            return Err(EeacError::Config("trajectory samples have inconsistent sizes".into()));
        }
        Ok(Self { samples })
    }

    #[inline]
    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    #[inline]
    pub fn initial_sample(&self) -> &TrajectorySample {
        &self.samples[0]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Trajectories always hold the initial sample.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True when only the initial state is known.
    pub fn is_initial_only(&self) -> bool {
        self.samples.len() == 1
    }

    /// Sample by observation moment; negative ids count from the end (`-1` = last).
    pub fn sample_at_moment(&self, moment: i64) -> Option<&TrajectorySample> {
        let len = self.samples.len() as i64;
        let idx = if moment < 0 { len + moment } else { moment };
        if (0..len).contains(&idx) {
            self.samples.get(idx as usize)
        } else {
            None
        }
    }

    pub fn observation_times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// (time, angle) series of one generator.
    pub fn angle_series(&self, generator: GeneratorId) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.time, s.angles[generator.value()]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64, regime: NetworkRegime, angle: f64) -> TrajectorySample {
        TrajectorySample {
            time,
            regime,
            angles: vec![angle, 0.0],
            speeds: vec![0.0, 0.0],
        }
    }

    #[test]
    fn test_moment_lookup_counts_from_end() {
        let trajectories = GeneratorTrajectories::from_samples(vec![
            sample(0.0, NetworkRegime::PreFault, 0.1),
            sample(0.05, NetworkRegime::DuringFault, 0.2),
            sample(0.1, NetworkRegime::PostFault, 0.4),
        ])
        .unwrap();
        assert_eq!(trajectories.sample_at_moment(-1).unwrap().time, 0.1);
        assert_eq!(trajectories.sample_at_moment(1).unwrap().time, 0.05);
        assert!(trajectories.sample_at_moment(3).is_none());
        assert!(trajectories.sample_at_moment(-4).is_none());
        assert_eq!(
            trajectories.angle_series(GeneratorId::new(0)),
            vec![(0.0, 0.1), (0.05, 0.2), (0.1, 0.4)]
        );
    }

    #[test]
    fn test_first_sample_must_be_pre_fault() {
        let err = GeneratorTrajectories::from_samples(vec![sample(0.0, NetworkRegime::DuringFault, 0.1)]);
        assert!(err.is_err());
        let err = GeneratorTrajectories::from_samples(vec![
            sample(0.0, NetworkRegime::PreFault, 0.1),
            sample(0.0, NetworkRegime::DuringFault, 0.1),
        ]);
        assert!(err.is_err());
    }
}
