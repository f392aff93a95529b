//! Unique job names of the form `<base>.<YYYY-MM-DD_HH.MM.SS>_<NN>`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

/// Names issued per clock second before the namer waits for the next one.
pub const NAMES_PER_SECOND: u32 = 60;

/// Longest base name kept before the timestamp suffix.
const MAX_BASE_LEN: usize = 100;

struct NamerState {
    last_second: i64,
    seq: u32,
}

pub struct JobNamer {
    state: Mutex<NamerState>,
}

impl Default for JobNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl JobNamer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NamerState {
                last_second: i64::MIN,
                seq: 0,
            }),
        }
    }

    /// Issues a name for `now`, or `None` when this second's sequence is used up.
    pub fn try_name_at<Tz: TimeZone>(&self, base: &str, now: &DateTime<Tz>) -> Option<String>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut state = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job namer lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let second = now.timestamp();
        if second != state.last_second {
            state.last_second = second;
            state.seq = 0;
        } else if state.seq >= NAMES_PER_SECOND {
            return None;
        }

        let seq = state.seq;
        state.seq += 1;
        drop(state);

        Some(format!(
            "{}.{}_{:02}",
            truncate_base(base),
            now.format("%Y-%m-%d_%H.%M.%S"),
            seq
        ))
    }

    /// Issues a name for the current local time, sleeping into the next second
    /// when needed.
    pub fn next_name(&self, base: &str) -> String {
        loop {
            if let Some(name) = self.try_name_at(base, &Local::now()) {
                return name;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

fn truncate_base(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if cleaned.chars().count() <= MAX_BASE_LEN {
        cleaned
    } else {
        cleaned.chars().take(MAX_BASE_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_name_format() {
        let namer = JobNamer::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 1, 2, 3).unwrap();
        let name = namer.try_name_at("nightly", &now).unwrap();
        assert_eq!(name, "nightly.2026-10-14_01.02.03_00");
        let name = namer.try_name_at("nightly", &now).unwrap();
        assert_eq!(name, "nightly.2026-10-14_01.02.03_01");
    }

    #[test]
    fn test_at_most_sixty_names_per_second() {
        let namer = JobNamer::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 1, 2, 3).unwrap();
        let names: Vec<String> = (0..NAMES_PER_SECOND)
            .map(|_| namer.try_name_at("job", &now).unwrap())
            .collect();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 60);
        assert!(namer.try_name_at("job", &now).is_none());

        let later = now + chrono::Duration::seconds(1);
        let name = namer.try_name_at("job", &later).unwrap();
        assert!(name.ends_with("_00"));
    }

    #[test]
    fn test_whitespace_in_base_is_replaced() {
        let namer = JobNamer::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let name = namer.try_name_at("my job", &now).unwrap();
        assert!(name.starts_with("my_job."));
    }
}
