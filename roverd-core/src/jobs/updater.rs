//! The worker pool draining the job queue, one sub-job per dequeue.

use super::{JobCatalog, JobLog, next_processing};
use crate::blob::ApkStorage;
use crate::error::Result;
use crate::link::{Communicator, DeviceLink};
use chrono::Utc;
use dashmap::DashMap;
use roverd_model::{
    ApkArch, ApkType, AutoCommand, AutoCommandSettings, JobLogEntry, JobStatus, SubJob, SubJobType,
    compare_versions,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Consecutive attempts of one sub-job before escalation.
const MAX_ATTEMPTS: u32 = 3;
/// Seconds before a NOT_CONNECTED job is retried.
const NOT_CONNECTED_RETRY_S: i64 = 60;

#[derive(Debug, Clone)]
pub struct JobUpdaterConfig {
    pub workers: usize,
    /// Minutes before a job that exhausted its attempts while
    /// NOT_CONNECTED is rescheduled; 0 fails it instead.
    pub job_restart_notconnect: i64,
    /// Directory INSTALLATION file arguments are resolved against.
    pub install_dir: PathBuf,
    /// versionName values smart update may push for pogo; None = any.
    pub supported_pogo_versions: Option<Vec<String>>,
    /// Timeout for install pushes, seconds.
    pub command_timeout_s: u64,
}

impl Default for JobUpdaterConfig {
    fn default() -> Self {
        JobUpdaterConfig {
            workers: 2,
            job_restart_notconnect: 0,
            install_dir: PathBuf::from("files"),
            supported_pogo_versions: None,
            command_timeout_s: 300,
        }
    }
}

/// Sink for job lifecycle events (webhooks, dashboards).
pub trait JobEventSink: Send + Sync {
    fn job_event(&self, entry: &JobLogEntry, event: &str);
}

/// Default sink: structured log lines only.
pub struct TracingEventSink;

impl JobEventSink for TracingEventSink {
    fn job_event(&self, entry: &JobLogEntry, event: &str) {
        info!(
            job = %entry.id,
            origin = %entry.origin,
            status = ?entry.last_status,
            event,
            "job event"
        );
    }
}

enum StepOutcome {
    Ok,
    NotRequired,
    NotSupported,
    Fail,
}

enum Disposition {
    Requeue,
    Done,
}

pub struct JobUpdater {
    config: JobUpdaterConfig,
    link: Arc<dyn DeviceLink>,
    storage: Arc<dyn ApkStorage>,
    log: Arc<JobLog>,
    events: Arc<dyn JobEventSink>,
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
    running: DashMap<String, String>,
    seq: std::sync::atomic::AtomicU64,
    cancel: CancellationToken,
}

impl JobUpdater {
    pub fn new(
        config: JobUpdaterConfig,
        link: Arc<dyn DeviceLink>,
        storage: Arc<dyn ApkStorage>,
        log: Arc<JobLog>,
        events: Arc<dyn JobEventSink>,
    ) -> Arc<Self> {
        Arc::new(JobUpdater {
            config,
            link,
            storage,
            log,
            events,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            running: DashMap::new(),
            seq: std::sync::atomic::AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    /// Spawn the worker pool.
    pub fn start(self: &Arc<Self>) {
        for worker in 0..self.config.workers.max(1) {
            let this = self.clone();
            tokio::spawn(async move {
                debug!(worker, "job worker up");
                loop {
                    if this.cancel.is_cancelled() {
                        break;
                    }
                    match this.run_once().await {
                        // Pace the queue so deferred jobs do not spin.
                        Ok(true) => {
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                        Ok(false) => {
                            tokio::select! {
                                _ = this.cancel.cancelled() => break,
                                _ = this.notify.notified() => {}
                            }
                        }
                        Err(err) => {
                            error!(worker, %err, "job step failed internally");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            });
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Resolve a job chain and enqueue it for `origin`.
    pub async fn add_job(
        &self,
        origin: &str,
        job_name: &str,
        catalog: &JobCatalog,
        auto: Option<AutoCommandSettings>,
    ) -> Result<String> {
        let sub_jobs = catalog.resolve(job_name)?;
        let seq = self.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let id = format!(
            "{origin}__{}_{seq}__{job_name}",
            Utc::now().timestamp_millis()
        );
        let mut entry = JobLogEntry::new(
            id.clone(),
            origin.to_string(),
            job_name.to_string(),
            sub_jobs,
        );
        entry.auto_command_settings = auto;
        self.log.upsert(entry).await?;
        self.push(id.clone());
        info!(origin, job = job_name, id, "job enqueued");
        Ok(id)
    }

    /// Schedule auto-commands loaded at startup.
    pub async fn apply_autocommands(
        &self,
        commands: &[AutoCommand],
        catalog: &JobCatalog,
    ) -> Result<()> {
        for command in commands {
            for origin in &command.origins {
                let settings = AutoCommandSettings {
                    algo_type: command.algo_type,
                    algo_value: command.algo_value.clone(),
                    redo: command.redo,
                    redo_on_error: command.redo_on_error,
                };
                let id = self
                    .add_job(origin, &command.job, catalog, Some(settings))
                    .await?;
                if !command.start_with_init {
                    if let Some(mut entry) = self.log.get(&id) {
                        entry.processing_date =
                            next_processing(command.algo_type, &command.algo_value, Utc::now());
                        self.log.upsert(entry).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Cancellation is advisory; it takes effect at the next sub-job
    /// boundary.
    pub async fn cancel_job(&self, id: &str) -> Result<bool> {
        let Some(mut entry) = self.log.get(id) else {
            return Ok(false);
        };
        entry.last_status = JobStatus::Cancelled;
        self.log.upsert(entry).await?;
        self.push(id.to_string());
        Ok(true)
    }

    /// Re-run a terminal job from its first sub-job.
    pub async fn restart_job(&self, id: &str) -> Result<bool> {
        let Some(mut entry) = self.log.get(id) else {
            return Ok(false);
        };
        entry.sub_job_index = 0;
        entry.counter = 0;
        entry.processing_date = None;
        entry.last_status = JobStatus::Pending;
        entry.returning = None;
        self.log.upsert(entry).await?;
        self.push(id.to_string());
        Ok(true)
    }

    fn push(&self, id: String) {
        self.queue.lock().push_back(id);
        self.notify.notify_one();
    }

    /// Process one queued job id; returns false when the queue was
    /// empty.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(id) = self.queue.lock().pop_front() else {
            return Ok(false);
        };
        let Some(mut entry) = self.log.get(&id) else {
            warn!(id, "queued job vanished from the log");
            return Ok(true);
        };

        // Per-origin mutual exclusion.
        let origin = entry.origin.clone();
        match self.running.entry(origin.clone()) {
            dashmap::mapref::entry::Entry::Occupied(running) if *running.get() != id => {
                debug!(id, origin, "origin busy, requeueing");
                self.push(id);
                return Ok(true);
            }
            dashmap::mapref::entry::Entry::Occupied(_) => {}
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let disposition = self.step(&mut entry).await;
        self.log.upsert(entry).await?;
        self.running.remove(&origin);
        if matches!(disposition, Disposition::Requeue) {
            self.push(id);
        }
        Ok(true)
    }

    async fn step(&self, entry: &mut JobLogEntry) -> Disposition {
        let now = Utc::now().timestamp();

        if entry.sub_job_index >= entry.sub_jobs.len() {
            if !entry.last_status.is_success() {
                entry.last_status = JobStatus::Success;
            }
            self.events.job_event(entry, "finished");
            if let Some(auto) = entry.auto_command_settings.clone() {
                if auto.redo {
                    entry.sub_job_index = 0;
                    entry.counter = 0;
                    entry.last_status = JobStatus::Pending;
                    entry.processing_date =
                        next_processing(auto.algo_type, &auto.algo_value, Utc::now());
                    return Disposition::Requeue;
                }
            }
            return Disposition::Done;
        }

        match entry.last_status {
            JobStatus::Cancelled => {
                self.events.job_event(entry, "cancelled");
                return Disposition::Done;
            }
            JobStatus::Failed => {
                self.events.job_event(entry, "terminated");
                return Disposition::Done;
            }
            _ => {}
        }

        if entry.counter > MAX_ATTEMPTS {
            return self.escalate(entry);
        }

        let sub_job = entry.sub_jobs[entry.sub_job_index].clone();
        if let Some(waittime) = sub_job.waittime {
            if entry.processing_date.is_none() {
                entry.processing_date = Some(now + 60 * waittime);
            }
        }
        if entry.processing_date.is_some_and(|at| at > now) {
            entry.last_status = JobStatus::Future;
            return Disposition::Requeue;
        }

        let Some(communicator) = self.link.get_communicator(&entry.origin) else {
            entry.last_status = JobStatus::NotConnected;
            entry.counter += 1;
            entry.processing_date = Some(now + NOT_CONNECTED_RETRY_S);
            return Disposition::Requeue;
        };

        entry.last_status = JobStatus::Processing;
        self.link.set_job_activated(&entry.origin);
        let outcome = self.dispatch(entry, &sub_job, communicator).await;
        self.link.set_job_deactivated(&entry.origin);

        match outcome {
            StepOutcome::Ok | StepOutcome::NotRequired | StepOutcome::NotSupported => {
                entry.sub_job_index += 1;
                entry.counter = 0;
                entry.processing_date = None;
                entry.last_status = match outcome {
                    StepOutcome::NotRequired => JobStatus::NotRequired,
                    StepOutcome::NotSupported => JobStatus::NotSupported,
                    _ => JobStatus::Success,
                };
                Disposition::Requeue
            }
            StepOutcome::Fail => {
                entry.last_status = JobStatus::Failing;
                entry.counter += 1;
                Disposition::Requeue
            }
        }
    }

    /// The attempt cap was hit; fail, defer, or recycle the job.
    fn escalate(&self, entry: &mut JobLogEntry) -> Disposition {
        match entry.last_status {
            JobStatus::NotConnected if self.config.job_restart_notconnect > 0 => {
                entry.processing_date = Some(
                    Utc::now().timestamp() + 60 * self.config.job_restart_notconnect,
                );
                entry.counter = 0;
                Disposition::Requeue
            }
            _ => {
                entry.last_status = JobStatus::Failed;
                self.events.job_event(entry, "terminated");
                if let Some(auto) = entry.auto_command_settings.clone() {
                    if auto.redo_on_error {
                        entry.sub_job_index = 0;
                        entry.counter = 0;
                        entry.last_status = JobStatus::Pending;
                        entry.processing_date =
                            next_processing(auto.algo_type, &auto.algo_value, Utc::now());
                        return Disposition::Requeue;
                    }
                }
                Disposition::Done
            }
        }
    }

    async fn dispatch(
        &self,
        entry: &mut JobLogEntry,
        sub_job: &SubJob,
        communicator: Arc<dyn Communicator>,
    ) -> StepOutcome {
        let result = match sub_job.job_type {
            SubJobType::Installation => self.run_installation(sub_job, &communicator).await,
            SubJobType::SmartUpdate => self.run_smart_update(sub_job, &communicator).await,
            SubJobType::Reboot => communicator.reboot().await.map(to_outcome),
            SubJobType::Restart => communicator
                .restart_app(package_arg(sub_job))
                .await
                .map(to_outcome),
            SubJobType::Stop => communicator
                .stop_app(package_arg(sub_job))
                .await
                .map(to_outcome),
            SubJobType::Start => communicator
                .start_app(package_arg(sub_job))
                .await
                .map(to_outcome),
            SubJobType::Passthrough => match communicator.passthrough(&sub_job.syntax).await {
                Ok(response) => {
                    let trimmed = response.trim().to_string();
                    let failed = trimmed.starts_with("KO:");
                    entry.returning = Some(trimmed);
                    Ok(if failed { StepOutcome::Fail } else { StepOutcome::Ok })
                }
                Err(err) => Err(err),
            },
            SubJobType::Chain => {
                // Chains are flattened at enqueue; a surviving one is a
                // catalog bug.
                error!(job = %entry.id, "unexpanded chain sub-job");
                Ok(StepOutcome::Fail)
            }
        };
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(job = %entry.id, origin = %entry.origin, %err, "sub-job errored");
                StepOutcome::Fail
            }
        }
    }

    async fn run_installation(
        &self,
        sub_job: &SubJob,
        communicator: &Arc<dyn Communicator>,
    ) -> Result<StepOutcome> {
        let path = self.config.install_dir.join(&sub_job.syntax);
        let data = tokio::fs::read(&path).await?;
        let ok = if sub_job.syntax.to_ascii_lowercase().ends_with(".zip") {
            communicator
                .install_bundle(self.config.command_timeout_s, data)
                .await?
        } else {
            communicator
                .install_apk(self.config.command_timeout_s, data)
                .await?
        };
        Ok(to_outcome(ok))
    }

    async fn run_smart_update(
        &self,
        sub_job: &SubJob,
        communicator: &Arc<dyn Communicator>,
    ) -> Result<StepOutcome> {
        let Some(package) = resolve_apk_type(&sub_job.syntax) else {
            warn!(argument = %sub_job.syntax, "smart update for unknown package");
            return Ok(StepOutcome::Fail);
        };
        let installed = communicator
            .package_version(package.package_name())
            .await?;
        let abi = communicator.cpu_abi().await?.unwrap_or_default();
        let arch = match package {
            ApkType::Pogo => ApkArch::from_abi(&abi),
            _ => ApkArch::Noarch,
        };

        let stored = match self.storage.get_current_version(package, arch).await? {
            Some(version) => (version, arch),
            None => match self
                .storage
                .get_current_version(package, ApkArch::Noarch)
                .await?
            {
                Some(version) => (version, ApkArch::Noarch),
                None => {
                    warn!(package = package.as_str(), "no stored package for smart update");
                    return Ok(StepOutcome::Fail);
                }
            },
        };

        if let Some(installed) = &installed {
            match compare_versions(&stored.0, installed) {
                std::cmp::Ordering::Equal | std::cmp::Ordering::Less => {
                    return Ok(StepOutcome::NotRequired);
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        if package == ApkType::Pogo {
            if let Some(supported) = &self.config.supported_pogo_versions {
                if !supported.contains(&stored.0) {
                    return Ok(StepOutcome::NotSupported);
                }
            }
        }

        let Some((info, data)) = self.storage.get_file(package, stored.1).await? else {
            return Ok(StepOutcome::Fail);
        };
        let ok = if info.mimetype == "application/zip" {
            communicator
                .install_bundle(self.config.command_timeout_s, data)
                .await?
        } else {
            communicator
                .install_apk(self.config.command_timeout_s, data)
                .await?
        };
        // RemoteGpsController reinstalls kill the channel mid-push; the
        // returncode is meaningless.
        if package == ApkType::Rgc {
            return Ok(StepOutcome::Ok);
        }
        Ok(to_outcome(ok))
    }
}

fn to_outcome(ok: bool) -> StepOutcome {
    if ok { StepOutcome::Ok } else { StepOutcome::Fail }
}

fn package_arg(sub_job: &SubJob) -> &str {
    if sub_job.syntax.is_empty() {
        ApkType::Pogo.package_name()
    } else {
        &sub_job.syntax
    }
}

/// Accepts both the short type name and the android package name.
fn resolve_apk_type(argument: &str) -> Option<ApkType> {
    if let Ok(ty) = ApkType::from_str(argument) {
        return Some(ty);
    }
    [ApkType::Pogo, ApkType::Rgc, ApkType::Pd]
        .into_iter()
        .find(|ty| ty.package_name() == argument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::DatabaseApkStorage;
    use crate::persistence::memory::MemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCommunicator {
        install_results: Mutex<VecDeque<bool>>,
        install_calls: AtomicUsize,
        restart_calls: AtomicUsize,
        version: Option<String>,
        abi: Option<String>,
    }

    #[async_trait::async_trait]
    impl Communicator for FakeCommunicator {
        async fn install_apk(&self, _timeout_s: u64, _data: Vec<u8>) -> Result<bool> {
            self.install_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.install_results.lock().pop_front().unwrap_or(true))
        }
        async fn install_bundle(&self, timeout_s: u64, data: Vec<u8>) -> Result<bool> {
            self.install_apk(timeout_s, data).await
        }
        async fn reboot(&self) -> Result<bool> {
            Ok(true)
        }
        async fn restart_app(&self, _package: &str) -> Result<bool> {
            self.restart_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn stop_app(&self, _package: &str) -> Result<bool> {
            Ok(true)
        }
        async fn start_app(&self, _package: &str) -> Result<bool> {
            Ok(true)
        }
        async fn passthrough(&self, command: &str) -> Result<String> {
            Ok(format!("OK: {command}\n"))
        }
        async fn package_version(&self, _package: &str) -> Result<Option<String>> {
            Ok(self.version.clone())
        }
        async fn cpu_abi(&self) -> Result<Option<String>> {
            Ok(self.abi.clone())
        }
    }

    struct FakeLink {
        devices: HashMap<String, Arc<FakeCommunicator>>,
        active: DashMap<String, bool>,
    }

    impl FakeLink {
        fn with(origin: &str, communicator: Arc<FakeCommunicator>) -> Arc<Self> {
            let mut devices = HashMap::new();
            devices.insert(origin.to_string(), communicator);
            Arc::new(FakeLink {
                devices,
                active: DashMap::new(),
            })
        }
    }

    impl DeviceLink for FakeLink {
        fn get_communicator(&self, origin: &str) -> Option<Arc<dyn Communicator>> {
            self.devices
                .get(origin)
                .map(|c| c.clone() as Arc<dyn Communicator>)
        }
        fn set_job_activated(&self, origin: &str) {
            self.active.insert(origin.to_string(), true);
        }
        fn set_job_deactivated(&self, origin: &str) {
            self.active.insert(origin.to_string(), false);
        }
        fn is_job_active(&self, origin: &str) -> bool {
            self.active.get(origin).map(|v| *v).unwrap_or(false)
        }
        fn force_disconnect(&self, _origin: &str) {}
        fn connected_origins(&self) -> Vec<String> {
            self.devices.keys().cloned().collect()
        }
    }

    fn catalog_with(name: &str, sub_jobs: Vec<SubJob>) -> JobCatalog {
        let mut map = HashMap::new();
        map.insert(name.to_string(), sub_jobs);
        JobCatalog::from_map(map)
    }

    fn sub(job_type: SubJobType, syntax: &str) -> SubJob {
        SubJob {
            job_type,
            syntax: syntax.to_string(),
            field_name: None,
            waittime: None,
        }
    }

    async fn updater(
        link: Arc<FakeLink>,
        install_dir: PathBuf,
    ) -> (Arc<JobUpdater>, Arc<JobLog>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(DatabaseApkStorage::new(store.clone()));
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(
            JobLog::open(dir.path().join("update_log.json")).await.unwrap(),
        );
        // Leak the tempdir so the log file survives the test body.
        std::mem::forget(dir);
        let config = JobUpdaterConfig {
            install_dir,
            ..Default::default()
        };
        let updater = JobUpdater::new(config, link, storage, log.clone(), Arc::new(TracingEventSink));
        (updater, log, store)
    }

    async fn drain(updater: &JobUpdater, max_steps: usize) {
        for _ in 0..max_steps {
            if !updater.run_once().await.unwrap() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn chain_retries_then_succeeds() {
        // INSTALLATION fails twice, succeeds third; RESTART then runs.
        let comm = Arc::new(FakeCommunicator {
            install_results: Mutex::new(VecDeque::from([false, false, true])),
            ..Default::default()
        });
        let link = FakeLink::with("d1", comm.clone());

        let files = tempfile::tempdir().unwrap();
        std::fs::write(files.path().join("a.apk"), b"bytes").unwrap();
        let (updater, log, _) = updater(link, files.path().to_path_buf()).await;

        let catalog = catalog_with(
            "reinstall",
            vec![sub(SubJobType::Installation, "a.apk"), sub(SubJobType::Restart, "")],
        );
        let id = updater.add_job("d1", "reinstall", &catalog, None).await.unwrap();

        // Two failing attempts.
        updater.run_once().await.unwrap();
        updater.run_once().await.unwrap();
        let entry = log.get(&id).unwrap();
        assert_eq!(entry.last_status, JobStatus::Failing);
        assert_eq!(entry.counter, 2);
        assert_eq!(entry.sub_job_index, 0);

        // Third attempt succeeds, counter resets, chain advances.
        updater.run_once().await.unwrap();
        let entry = log.get(&id).unwrap();
        assert_eq!(entry.counter, 0);
        assert_eq!(entry.sub_job_index, 1);

        drain(&updater, 4).await;
        let entry = log.get(&id).unwrap();
        assert_eq!(entry.last_status, JobStatus::Success);
        assert_eq!(entry.sub_job_index, 2);
        assert_eq!(comm.restart_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn smart_update_same_version_is_not_required() {
        let comm = Arc::new(FakeCommunicator {
            version: Some("0.123.0".to_string()),
            abi: Some("armeabi-v7a".to_string()),
            ..Default::default()
        });
        let link = FakeLink::with("d1", comm.clone());
        let (updater, log, store) = updater(link, PathBuf::from("unused")).await;

        DatabaseApkStorage::new(store)
            .save_file(
                ApkType::Pogo,
                ApkArch::ArmeabiV7a,
                "0.123.0",
                "application/vnd.android.package-archive",
                vec![1, 2, 3],
            )
            .await
            .unwrap();

        let catalog = catalog_with(
            "update",
            vec![sub(SubJobType::SmartUpdate, "com.nianticlabs.pokemongo")],
        );
        let id = updater.add_job("d1", "update", &catalog, None).await.unwrap();
        drain(&updater, 4).await;

        let entry = log.get(&id).unwrap();
        assert_eq!(entry.sub_job_index, 1);
        assert!(entry.last_status.is_success());
        assert_eq!(comm.install_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn smart_update_pushes_newer_version() {
        let comm = Arc::new(FakeCommunicator {
            version: Some("0.122.0".to_string()),
            abi: Some("armeabi-v7a".to_string()),
            ..Default::default()
        });
        let link = FakeLink::with("d1", comm.clone());
        let (updater, log, store) = updater(link, PathBuf::from("unused")).await;
        DatabaseApkStorage::new(store)
            .save_file(
                ApkType::Pogo,
                ApkArch::ArmeabiV7a,
                "0.123.0",
                "application/vnd.android.package-archive",
                vec![9; 32],
            )
            .await
            .unwrap();

        let catalog = catalog_with("update", vec![sub(SubJobType::SmartUpdate, "pogo")]);
        let id = updater.add_job("d1", "update", &catalog, None).await.unwrap();
        drain(&updater, 4).await;

        assert_eq!(comm.install_calls.load(Ordering::SeqCst), 1);
        assert!(log.get(&id).unwrap().last_status.is_success());
    }

    #[tokio::test]
    async fn disconnected_device_defers_job() {
        let link = Arc::new(FakeLink {
            devices: HashMap::new(),
            active: DashMap::new(),
        });
        let (updater, log, _) = updater(link, PathBuf::from("unused")).await;
        let catalog = catalog_with("reboot", vec![sub(SubJobType::Reboot, "")]);
        let id = updater.add_job("ghost", "reboot", &catalog, None).await.unwrap();

        updater.run_once().await.unwrap();
        let entry = log.get(&id).unwrap();
        assert_eq!(entry.last_status, JobStatus::NotConnected);
        assert_eq!(entry.counter, 1);
        assert!(entry.processing_date.is_some());

        // Still deferred: the next pass parks it as FUTURE.
        updater.run_once().await.unwrap();
        assert_eq!(log.get(&id).unwrap().last_status, JobStatus::Future);
    }

    #[tokio::test]
    async fn passthrough_ko_counts_as_failure() {
        struct KoComm;
        #[async_trait::async_trait]
        impl Communicator for KoComm {
            async fn install_apk(&self, _: u64, _: Vec<u8>) -> Result<bool> {
                Ok(false)
            }
            async fn install_bundle(&self, _: u64, _: Vec<u8>) -> Result<bool> {
                Ok(false)
            }
            async fn reboot(&self) -> Result<bool> {
                Ok(true)
            }
            async fn restart_app(&self, _: &str) -> Result<bool> {
                Ok(true)
            }
            async fn stop_app(&self, _: &str) -> Result<bool> {
                Ok(true)
            }
            async fn start_app(&self, _: &str) -> Result<bool> {
                Ok(true)
            }
            async fn passthrough(&self, _: &str) -> Result<String> {
                Ok("KO: denied\n".to_string())
            }
            async fn package_version(&self, _: &str) -> Result<Option<String>> {
                Ok(None)
            }
            async fn cpu_abi(&self) -> Result<Option<String>> {
                Ok(None)
            }
        }

        let mut devices = HashMap::new();
        let ko: Arc<FakeCommunicator> = Arc::new(FakeCommunicator::default());
        devices.insert("unused".to_string(), ko);
        let link = Arc::new(FakeLink {
            devices,
            active: DashMap::new(),
        });
        let (updater, log, _) = updater(link, PathBuf::from("unused")).await;

        let mut entry = JobLogEntry::new(
            "j-ko".to_string(),
            "d1".to_string(),
            "shell".to_string(),
            vec![sub(SubJobType::Passthrough, "rm -rf /cache")],
        );
        entry.last_status = JobStatus::Pending;
        log.upsert(entry.clone()).await.unwrap();

        let outcome = updater
            .dispatch(&mut entry, &sub(SubJobType::Passthrough, "x"), Arc::new(KoComm))
            .await;
        assert!(matches!(outcome, StepOutcome::Fail));
        assert_eq!(entry.returning.as_deref(), Some("KO: denied"));
    }

    #[tokio::test]
    async fn per_origin_exclusion_requeues_second_job() {
        let comm = Arc::new(FakeCommunicator::default());
        let link = FakeLink::with("d1", comm);
        let (updater, log, _) = updater(link, PathBuf::from("unused")).await;
        let catalog = catalog_with("reboot", vec![sub(SubJobType::Reboot, "")]);

        let id = updater.add_job("d1", "reboot", &catalog, None).await.unwrap();
        updater.running.insert("d1".to_string(), "other-job".to_string());

        // The held origin bounces the job back to the queue untouched.
        updater.run_once().await.unwrap();
        assert_eq!(log.get(&id).unwrap().last_status, JobStatus::Pending);
        assert_eq!(updater.queued(), 1);
        updater.running.remove("d1");
    }

    #[tokio::test]
    async fn redo_reschedules_completed_job() {
        let comm = Arc::new(FakeCommunicator::default());
        let link = FakeLink::with("d1", comm);
        let (updater, log, _) = updater(link, PathBuf::from("unused")).await;
        let catalog = catalog_with("reboot", vec![sub(SubJobType::Reboot, "")]);
        let settings = AutoCommandSettings {
            algo_type: roverd_model::JobAlgo::Loop,
            algo_value: "30".to_string(),
            redo: true,
            redo_on_error: false,
        };
        let id = updater
            .add_job("d1", "reboot", &catalog, Some(settings))
            .await
            .unwrap();

        // Run the single step, then the completion step.
        updater.run_once().await.unwrap();
        updater.run_once().await.unwrap();
        let entry = log.get(&id).unwrap();
        assert_eq!(entry.sub_job_index, 0);
        assert_eq!(entry.last_status, JobStatus::Pending);
        assert!(entry.processing_date.unwrap() > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn cancel_takes_effect_at_boundary() {
        let comm = Arc::new(FakeCommunicator::default());
        let link = FakeLink::with("d1", comm.clone());
        let (updater, log, _) = updater(link, PathBuf::from("unused")).await;
        let catalog = catalog_with("reboot", vec![sub(SubJobType::Reboot, "")]);
        let id = updater.add_job("d1", "reboot", &catalog, None).await.unwrap();

        updater.cancel_job(&id).await.unwrap();
        drain(&updater, 4).await;
        assert_eq!(log.get(&id).unwrap().last_status, JobStatus::Cancelled);
    }
}
