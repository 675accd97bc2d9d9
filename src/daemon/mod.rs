use anyhow::Result;
use log::{error, info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use crate::config::{AppConfig, Config, Paths};
use crate::error::CycleError;
use crate::feed::{CycleContext, CycleOutcome, PruneReport, Reconciler, run_cycle};
use crate::mail::MailSource;
use crate::store::KvStore;

pub const TICK: Duration = Duration::from_secs(1);
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Sweep,
    Prune,
}

/// Decides which job, if any, runs on a tick.
#[derive(Debug, Clone)]
pub struct Schedule {
    sweep_every: Duration,
    prune_every: Duration,
    next_sweep: Instant,
    next_prune: Instant,
}

impl Schedule {
    /// The first sweep is due immediately; the first prune one interval
    /// after `start`, since the daemon prunes once before its loop.
    pub fn new(sweep_every: Duration, prune_every: Duration, start: Instant) -> Self {
        Self {
            sweep_every,
            prune_every,
            next_sweep: start,
            next_prune: start + prune_every,
        }
    }

    pub fn from_config(app: &AppConfig, start: Instant) -> Self {
        Self::new(
            Duration::from_secs(app.wait_to_update * 60),
            PRUNE_INTERVAL,
            start,
        )
    }

    /// At most one job per tick. When both are due the prune runs and the
    /// sweep waits for the following tick.
    pub fn due(&mut self, now: Instant) -> Option<Job> {
        if now >= self.next_prune {
            self.next_prune = now + self.prune_every;
            return Some(Job::Prune);
        }
        if now >= self.next_sweep {
            self.next_sweep = now + self.sweep_every;
            return Some(Job::Sweep);
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub completed: Vec<CycleOutcome>,
    pub failed: Vec<String>,
    /// Feeds skipped because shutdown was requested mid-sweep.
    pub skipped: usize,
}

/// One cycle per configured feed, in name order. Stops starting new cycles
/// once `running` is cleared.
pub fn run_sweep(
    config: &Config,
    paths: &Paths,
    store: &dyn KvStore,
    source: &dyn MailSource,
    running: &AtomicBool,
) -> SweepReport {
    info!("Mail fetch and feed generation starting");
    let ctx = CycleContext {
        config,
        paths,
        store,
    };
    let mut report = SweepReport::default();
    let feed_names = config.feed_names();
    let total = feed_names.len();

    for (done, feed_name) in feed_names.into_iter().enumerate() {
        if !running.load(Ordering::SeqCst) {
            report.skipped = total - done;
            warn!("Shutdown requested; skipping {} remaining feeds", report.skipped);
            break;
        }
        match run_cycle(&ctx, &feed_name, source) {
            Ok(outcome) => {
                info!(
                    "Feed '{}' generated: {} new entries, {} alternates evicted",
                    outcome.feed_name, outcome.added, outcome.evicted
                );
                report.completed.push(outcome);
            }
            Err(CycleError::Fetch(e)) if e.is_transient() => {
                warn!("Feed '{feed_name}' skipped this sweep: {e}");
                report.failed.push(feed_name);
            }
            Err(e) => {
                error!("Feed '{feed_name}' cycle failed: {e}");
                report.failed.push(feed_name);
            }
        }
    }
    report
}

pub fn run_prune(config: &Config, paths: &Paths, store: &dyn KvStore) -> PruneReport {
    info!("Cleaning up state of unconfigured feeds");
    Reconciler::new(store, paths).prune_orphans(&config.feed_names())
}

/// Flag cleared on SIGINT, SIGTERM or SIGHUP. Can be installed once per
/// process.
pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Prune once, then tick until a shutdown signal. The job in flight when
/// the signal arrives finishes before the loop exits.
pub fn run_daemon(
    config: &Config,
    paths: &Paths,
    store: &dyn KvStore,
    source: &dyn MailSource,
) -> Result<()> {
    let running = shutdown_flag()?;

    paths.make_run_dirs()?;
    run_prune(config, paths, store);

    let mut schedule = Schedule::from_config(&config.app, Instant::now());
    info!(
        "Daemon started: {} feeds, sweeping every {} minutes",
        config.feeds.len(),
        config.app.wait_to_update
    );

    while running.load(Ordering::SeqCst) {
        match schedule.due(Instant::now()) {
            Some(Job::Sweep) => {
                run_sweep(config, paths, store, source, &running);
            }
            Some(Job::Prune) => {
                run_prune(config, paths, store);
            }
            None => {}
        }
        thread::sleep(TICK);
    }

    warn!("Shutdown requested; exiting after in-progress work");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::domain::mail::{MailId, MailMessage};
    use crate::error::FetchError;
    use crate::mail::FetchRequest;
    use crate::store::SqliteStore;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    const CONFIG: &str = r#"
[accounts.personal.server]
host = "mail.example.com"

[accounts.personal.auth]
auth_type = "login"
user = "me@example.com"
password = "secret"

[feeds.alpha]
account_name = "personal"

[feeds.beta]
account_name = "personal"
"#;

    /// Counts fetches; optionally fails every one as a network fault.
    struct RecordingSource {
        calls: RefCell<Vec<String>>,
        fail_transient: bool,
    }

    impl MailSource for RecordingSource {
        fn fetch(
            &self,
            request: &FetchRequest<'_>,
        ) -> std::result::Result<BTreeMap<MailId, MailMessage>, FetchError> {
            self.calls.borrow_mut().push(request.account_name.to_string());
            if self.fail_transient {
                return Err(FetchError::Transient("connection reset".to_string()));
            }
            Ok(BTreeMap::new())
        }
    }

    fn source(fail_transient: bool) -> RecordingSource {
        RecordingSource {
            calls: RefCell::new(Vec::new()),
            fail_transient,
        }
    }

    #[test]
    fn test_first_sweep_due_immediately() {
        let start = Instant::now();
        let mut schedule = Schedule::new(Duration::from_secs(60), PRUNE_INTERVAL, start);

        assert_eq!(schedule.due(start), Some(Job::Sweep));
        assert_eq!(schedule.due(start + Duration::from_secs(30)), None);
        assert_eq!(schedule.due(start + Duration::from_secs(60)), Some(Job::Sweep));
    }

    #[test]
    fn test_never_sweep_and_prune_in_one_tick() {
        let start = Instant::now();
        let mut schedule = Schedule::new(Duration::from_secs(60), Duration::from_secs(120), start);
        assert_eq!(schedule.due(start), Some(Job::Sweep));

        let both_due = start + Duration::from_secs(120);
        assert_eq!(schedule.due(both_due), Some(Job::Prune));
        assert_eq!(schedule.due(both_due + TICK), Some(Job::Sweep));
        assert_eq!(schedule.due(both_due + TICK * 2), None);
    }

    #[test]
    fn test_schedule_from_config_uses_minutes() {
        let cfg = parse_config(CONFIG).unwrap();
        let start = Instant::now();
        let mut schedule = Schedule::from_config(&cfg.app, start);
        schedule.due(start);

        assert_eq!(schedule.due(start + Duration::from_secs(14 * 60)), None);
        assert_eq!(
            schedule.due(start + Duration::from_secs(15 * 60)),
            Some(Job::Sweep)
        );
    }

    #[test]
    fn test_sweep_runs_every_feed() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = parse_config(CONFIG).unwrap();
        let paths = Paths::new(dir.path(), &dir.path().join("static"));
        let store = SqliteStore::open_in_memory().unwrap();
        let src = source(false);

        let report = run_sweep(&cfg, &paths, &store, &src, &AtomicBool::new(true));

        assert_eq!(report.completed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(paths.feed_file("alpha").exists());
        assert!(paths.feed_file("beta").exists());
    }

    #[test]
    fn test_transient_failure_is_per_feed() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = parse_config(CONFIG).unwrap();
        let paths = Paths::new(dir.path(), &dir.path().join("static"));
        let store = SqliteStore::open_in_memory().unwrap();
        let src = source(true);

        let report = run_sweep(&cfg, &paths, &store, &src, &AtomicBool::new(true));

        assert_eq!(src.calls.borrow().len(), 2);
        assert_eq!(report.failed, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(!paths.feed_file("alpha").exists());
    }

    #[test]
    fn test_sweep_stops_after_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = parse_config(CONFIG).unwrap();
        let paths = Paths::new(dir.path(), &dir.path().join("static"));
        let store = SqliteStore::open_in_memory().unwrap();
        let src = source(false);

        let report = run_sweep(&cfg, &paths, &store, &src, &AtomicBool::new(false));

        assert!(src.calls.borrow().is_empty());
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn test_prune_uses_configured_feeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = parse_config(CONFIG).unwrap();
        let paths = Paths::new(dir.path(), &dir.path().join("static"));
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(crate::store::StoreName::SeenMail, "retired", "[1]")
            .unwrap();
        store
            .put(crate::store::StoreName::SeenMail, "alpha", "[1]")
            .unwrap();

        let report = run_prune(&cfg, &paths, &store);

        assert_eq!(report.removed_from(crate::store::StoreName::SeenMail), 1);
        assert!(
            store
                .get(crate::store::StoreName::SeenMail, "alpha")
                .unwrap()
                .is_some()
        );
    }
}
