use std::time::Duration;

use indexmap::IndexMap;

/// Tunable limits for one job kind. Populated once at startup and read-only
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProfile {
    pub default_steps: u32,
    pub max_steps: u32,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
}

/// Conservative limits applied when a kind has no registry entry.
pub const FALLBACK_PROFILE: JobProfile = JobProfile {
    default_steps: 25,
    max_steps: 50,
    max_attempts: 30,
    timeout_seconds: 180,
};

impl JobProfile {
    /// Clamps a requested step count into `[1, max_steps]`; an absent or
    /// zero request means the kind's default.
    pub fn effective_steps(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.default_steps,
            Some(steps) => steps.clamp(1, self.max_steps),
        }
    }

    /// Delay between status queries: the timeout spread evenly over the
    /// attempt budget, capped at five seconds so a large timeout with few
    /// attempts cannot produce one huge sleep.
    pub fn poll_interval(&self) -> Duration {
        let spread = self.timeout_seconds as f64 / self.max_attempts.max(1) as f64;
        Duration::from_secs_f64(spread.min(5.0))
    }
}

#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: IndexMap<String, JobProfile>,
}

impl ProfileRegistry {
    pub fn new(profiles: Option<IndexMap<String, JobProfile>>) -> Self {
        Self {
            profiles: profiles.unwrap_or_else(default_profiles),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&JobProfile> {
        self.profiles.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_profiles() -> IndexMap<String, JobProfile> {
    let mut map = IndexMap::new();

    let mut insert = |kind: &str,
                      default_steps: u32,
                      max_steps: u32,
                      max_attempts: u32,
                      timeout_seconds: u64| {
        map.insert(
            kind.to_string(),
            JobProfile {
                default_steps,
                max_steps,
                max_attempts,
                timeout_seconds,
            },
        );
    };

    insert("image", 25, 50, 60, 300);
    insert("image-turbo", 4, 12, 30, 120);
    insert("video", 30, 50, 120, 900);
    insert("audio", 25, 50, 45, 240);
    insert("music", 25, 50, 90, 600);
    insert("model3d", 30, 60, 90, 600);

    map
}
