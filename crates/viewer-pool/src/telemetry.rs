//! Tracing setup and rate-limited logging helpers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with VIEWER_POOL_LOG and LOG_FORMAT support.
///
/// `RUST_LOG` takes precedence when set. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("VIEWER_POOL_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "viewer_pool={level},viewer_pool_sim={level}",
            level = level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

/// Counts occurrences of a noisy event and says when one should be logged:
/// the first, then every `every`-th.
#[derive(Debug)]
pub struct LogThrottle {
    count: AtomicU64,
    every: u64,
}

impl LogThrottle {
    pub const fn new(every: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            every: if every == 0 { 1 } else { every },
        }
    }

    /// Record one occurrence. Returns the running total when this one
    /// should be logged.
    pub fn hit(&self) -> Option<u64> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        (n == 1 || n % self.every == 0).then_some(n)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// One-shot flag for warnings that should appear once until re-armed.
#[derive(Debug, Default)]
pub struct WarnOnce(AtomicBool);

impl WarnOnce {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// True exactly once.
    pub fn first(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_logs_first_and_every_nth() {
        let throttle = LogThrottle::new(3);
        let logged: Vec<u64> = (0..7).filter_map(|_| throttle.hit()).collect();
        assert_eq!(logged, vec![1, 3, 6]);
        assert_eq!(throttle.count(), 7);
    }

    #[test]
    fn zero_interval_logs_everything() {
        let throttle = LogThrottle::new(0);
        assert_eq!(throttle.hit(), Some(1));
        assert_eq!(throttle.hit(), Some(2));
    }

    #[test]
    fn warn_once_fires_once_until_reset() {
        let flag = WarnOnce::new();
        assert!(flag.first());
        assert!(!flag.first());
        flag.reset();
        assert!(flag.first());
    }
}
