/*!
 * Combining Configuration
 *
 * Runtime configuration for lock discipline and pass-count selection
 */

use crate::core::errors::{FcError, FcResult};
use crate::core::limits::{
    DEFAULT_LEARNING_RATE, DEFAULT_SPIN_LIMIT, DEFAULT_THREADS, DEFAULT_TUNING_LEVELS,
    EXPLORE_INTERVAL, MAX_THREADS,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a thread competes for the combiner role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockDiscipline {
    /// One CAS on a shared flag, spin with backoff while checking the own slot
    Spin,
    /// Park on the lock, aborting the wait once the own slot was serviced
    AbortSemaphore,
}

/// Where a combiner gets its pass budget from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    /// Learned per (structure, thread) by the tuner
    Adaptive,
    /// Constant pass count
    Fixed(u32),
}

/// Configuration of one flat-combining structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// Number of thread ids callers may use (`0..num_threads`)
    pub num_threads: usize,
    /// Combiner lock discipline
    pub discipline: LockDiscipline,
    /// Pass-count source
    pub tuning: TuningMode,
    /// Report each session's change count to the monitor
    pub auto_reward: bool,
    /// One session in `explore_interval` explores (power of two)
    pub explore_interval: u64,
    /// Backoff steps a spinning waiter takes before re-reading the lock
    pub spin_limit: u32,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            num_threads: DEFAULT_THREADS,
            discipline: LockDiscipline::AbortSemaphore,
            tuning: TuningMode::Adaptive,
            auto_reward: true,
            explore_interval: EXPLORE_INTERVAL,
            spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }
}

impl FcConfig {
    /// Non-adaptive configuration with a constant pass count
    pub fn fixed(passes: u32) -> Self {
        Self {
            tuning: TuningMode::Fixed(passes),
            ..Default::default()
        }
    }

    /// Adaptive configuration using the spin discipline
    pub fn spinning() -> Self {
        Self {
            discipline: LockDiscipline::Spin,
            ..Default::default()
        }
    }

    /// Set the number of thread ids
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the lock discipline
    pub fn with_discipline(mut self, discipline: LockDiscipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Set the exploration interval
    pub fn with_explore_interval(mut self, interval: u64) -> Self {
        self.explore_interval = interval;
        self
    }

    /// Whether the pass count is learned
    #[inline]
    pub fn is_adaptive(&self) -> bool {
        matches!(self.tuning, TuningMode::Adaptive)
    }

    /// Mask applied to the session counter to decide exploration
    #[inline]
    pub fn explore_mask(&self) -> u64 {
        self.explore_interval.saturating_sub(1)
    }

    /// Check the configuration for values the combiners cannot honor
    pub fn validate(&self) -> FcResult<()> {
        if self.num_threads == 0 {
            return Err(FcError::InvalidConfig("num_threads must be at least 1".into()));
        }
        if self.num_threads > MAX_THREADS {
            return Err(FcError::TooManyThreads {
                requested: self.num_threads,
                max: MAX_THREADS,
            });
        }
        if !self.explore_interval.is_power_of_two() {
            return Err(FcError::InvalidConfig(format!(
                "explore_interval must be a power of two, got {}",
                self.explore_interval
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> FcResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration overridden by environment variables
    ///
    /// - `FC_LOCK_DISCIPLINE`: `spin` or `abort`
    /// - `FC_PASSES`: constant pass count (disables tuning)
    /// - `FC_THREADS`: number of thread ids
    pub fn from_env() -> FcResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("FC_LOCK_DISCIPLINE") {
            config.discipline = match value.to_ascii_lowercase().as_str() {
                "spin" => LockDiscipline::Spin,
                "abort" | "abort_semaphore" => LockDiscipline::AbortSemaphore,
                other => {
                    warn!(value = other, "Unknown FC_LOCK_DISCIPLINE, keeping default");
                    config.discipline
                }
            };
        }

        if let Ok(value) = std::env::var("FC_PASSES") {
            let passes = value
                .parse::<u32>()
                .map_err(|e| FcError::ConfigParse(format!("FC_PASSES: {e}")))?;
            config.tuning = TuningMode::Fixed(passes);
        }

        if let Ok(value) = std::env::var("FC_THREADS") {
            config.num_threads = value
                .parse::<usize>()
                .map_err(|e| FcError::ConfigParse(format!("FC_THREADS: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Configuration of the default tuning policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Number of discrete values (`0..levels`)
    pub levels: u32,
    /// Weight of the newest reward in each estimate (0, 1]
    pub learning_rate: f64,
    /// Value used before any reward was observed
    pub initial_value: u32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_TUNING_LEVELS,
            learning_rate: DEFAULT_LEARNING_RATE,
            initial_value: 0,
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> FcResult<()> {
        if self.levels == 0 {
            return Err(FcError::InvalidConfig("levels must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(FcError::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if self.initial_value >= self.levels {
            return Err(FcError::InvalidConfig(format!(
                "initial_value {} is outside 0..{}",
                self.initial_value, self.levels
            )));
        }
        Ok(())
    }
}
