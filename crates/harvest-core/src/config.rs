use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// How jobs are admitted into the in-flight set.
///
/// The two policies have different latency profiles when job durations are
/// skewed: a windowed barrier waits for the slowest job of each window before
/// admitting the next window, a continuous pool refills a slot as soon as any
/// job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// A fixed pool of `pool_size` workers pulling from a shared queue.
    Continuous { pool_size: usize },
    /// Launch `window_size` jobs together and wait for all of them.
    Windowed { window_size: usize },
}

impl AdmissionPolicy {
    /// Maximum number of jobs in flight at any instant.
    pub fn limit(&self) -> usize {
        match self {
            AdmissionPolicy::Continuous { pool_size } => *pool_size,
            AdmissionPolicy::Windowed { window_size } => *window_size,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit() == 0 {
            return Err(AppError::InvalidConfig(format!(
                "{self} needs a size of at least 1"
            )));
        }
        Ok(())
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        AdmissionPolicy::Continuous { pool_size: 5 }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionPolicy::Continuous { pool_size } => write!(f, "continuous pool ({pool_size})"),
            AdmissionPolicy::Windowed { window_size } => {
                write!(f, "windowed barrier ({window_size})")
            }
        }
    }
}

/// Policy name as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Pool,
    Window,
}

impl PolicyKind {
    pub fn with_size(self, size: usize) -> AdmissionPolicy {
        match self {
            PolicyKind::Pool => AdmissionPolicy::Continuous { pool_size: size },
            PolicyKind::Window => AdmissionPolicy::Windowed { window_size: size },
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pool" | "continuous" => Ok(PolicyKind::Pool),
            "window" | "windowed" => Ok(PolicyKind::Window),
            _ => Err(format!("Unknown admission policy: {s}")),
        }
    }
}

/// Optional fields an extractor should populate.
///
/// Disabled fields are left empty rather than scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    pub descriptions: bool,
    pub images: bool,
    pub options: bool,
    pub ratings: bool,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self {
            descriptions: true,
            images: true,
            options: true,
            ratings: true,
        }
    }
}

impl FieldSet {
    /// Only the required fields.
    pub fn minimal() -> Self {
        Self {
            descriptions: false,
            images: false,
            options: false,
            ratings: false,
        }
    }
}

/// Configuration for one extraction run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub policy: AdmissionPolicy,
    pub fields: FieldSet,
    /// How long an appender may wait for the shared store lock.
    pub lock_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::default(),
            fields: FieldSet::default(),
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    pub fn with_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fields(mut self, fields: FieldSet) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}
