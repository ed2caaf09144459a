//! The long-lived updater: configuration, the background worker, and the
//! check/restart orchestration.
//!
//! [`manage`] wires a [`Config`] into an [`Updater`] and spawns one
//! background task that performs the configured checks. A check walks the
//! whole pipeline: ask the [`Source`] for the latest version, compare
//! against the local reference, ask the host application for confirmation,
//! fetch signature and image, hand both to the apply engine, and finally
//! restart into the replaced binary (again behind an optional
//! confirmation).
//!
//! Checks are serialised: the background worker and any caller-initiated
//! [`Updater::check_now`] contend on one async mutex that is held for the
//! whole check, network and disk included.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use upkeep::{manage, Config, HttpSource, Schedule};
//!
//! # async fn example() -> Result<(), upkeep::UpdateError> {
//! let source = HttpSource::new(None, "https://dl.example.com/app-{{.OS}}-{{.Arch}}{{.Ext}}");
//! let public_key = upkeep::ed25519_dalek::VerifyingKey::from_bytes(&[0u8; 32])
//!     .expect("embedded public key is valid");
//!
//! let config = Config::new(source, public_key).schedule(Schedule {
//!     fetch_on_start: true,
//!     interval: Some(Duration::from_secs(24 * 3600)),
//!     ..Schedule::default()
//! });
//!
//! // Keep the updater alive for the process lifetime, or call `stop()`.
//! let updater = manage(config)?;
//! # let _ = updater;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::{Arc, OnceLock};

use ed25519_dalek::VerifyingKey;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::apply::{ApplyOptions, apply};
use crate::error::UpdateError;
use crate::platform;
use crate::progress::{ProgressCallback, ProgressStream};
use crate::schedule::{Repeating, Schedule, delay_until_next};
use crate::source::Source;
use crate::verify::PublicKey;
use crate::version::Version;

/// Asks the host application whether to download and apply an available
/// upgrade; receives a short human-readable prompt.
pub type UpgradeConfirmCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Asks the host application whether to restart right after a successful
/// apply. Declining leaves the replaced binary to be picked up at the next
/// natural launch.
pub type RestartConfirmCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// Takes over process teardown after a restart attempt; receives the spawn
/// error, if any. Without this callback the updater exits the process itself
/// on a successful spawn.
pub type ExitCallback = Box<dyn Fn(Option<&io::Error>) + Send + Sync>;

/// Everything an [`Updater`] needs: the transport, the trust anchor, the
/// schedule and the optional host-application hooks.
pub struct Config {
    /// Version of the running executable. When `None`, the executable's
    /// modification time is used as the reference.
    pub current: Option<Version>,
    /// Where to fetch updates from.
    pub source: Box<dyn Source>,
    /// When to check.
    pub schedule: Schedule,
    /// Ed25519 key matching the private key the publisher signs builds with.
    pub public_key: VerifyingKey,
    /// Reports download progress.
    pub progress_callback: Option<ProgressCallback>,
    /// Gates the download/apply of an available upgrade.
    pub upgrade_confirm_callback: Option<UpgradeConfirmCallback>,
    /// Gates the restart after a successful apply.
    pub restart_confirm_callback: Option<RestartConfirmCallback>,
    /// Handles process teardown after the restart spawn.
    pub exit_callback: Option<ExitCallback>,
}

impl Config {
    /// A configuration with no schedule and no callbacks; combine with the
    /// builder methods below.
    pub fn new<S: Source + 'static>(source: S, public_key: VerifyingKey) -> Self {
        Self {
            current: None,
            source: Box::new(source),
            schedule: Schedule::default(),
            public_key,
            progress_callback: None,
            upgrade_confirm_callback: None,
            restart_confirm_callback: None,
            exit_callback: None,
        }
    }

    /// Set the explicit current version, overriding the executable-mtime
    /// reference.
    pub fn current(mut self, version: Version) -> Self {
        self.current = Some(version);
        self
    }

    /// Set when checks run.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Report download progress to `callback`.
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Ask `callback` before downloading an available upgrade.
    pub fn confirm_upgrade(
        mut self,
        callback: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.upgrade_confirm_callback = Some(Box::new(callback));
        self
    }

    /// Ask `callback` before restarting into the new binary.
    pub fn confirm_restart(mut self, callback: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.restart_confirm_callback = Some(Box::new(callback));
        self
    }

    /// Let `callback` handle process teardown after the restart spawn.
    pub fn on_exit(
        mut self,
        callback: impl Fn(Option<&io::Error>) + Send + Sync + 'static,
    ) -> Self {
        self.exit_callback = Some(Box::new(callback));
        self
    }
}

#[derive(Default)]
struct State {
    /// Target path of the last successful apply; preferred re-exec target.
    executable: Option<PathBuf>,
}

struct Shared {
    config: Config,
    state: Mutex<State>,
    worker: OnceLock<AbortHandle>,
}

/// Manages updates of the running executable in the background.
///
/// Created by [`manage`]. Cloning is cheap and every clone drives the same
/// underlying updater. Dropping all clones does *not* stop the background
/// worker; call [`Updater::stop`] for that.
#[derive(Clone)]
pub struct Updater {
    shared: Arc<Shared>,
}

impl Updater {
    /// Check for an update now, applying and restarting if one is found and
    /// confirmed.
    ///
    /// Checks are serialised per updater; concurrent calls queue on the
    /// internal mutex. Finding no update, or the host application declining
    /// one of the confirmations, is a success.
    pub async fn check_now(&self) -> Result<(), UpdateError> {
        let mut state = self.shared.state.lock().await;
        let config = &self.shared.config;

        let reference = match &config.current {
            Some(version) => version.clone(),
            None => Version::for_current_executable()?,
        };

        let latest = config.source.latest_version().await?;
        if !latest.is_newer_than(&reference) {
            debug!(
                "local binary time ({}) is recent enough compared to the online version ({})",
                format_date(&reference),
                format_date(&latest),
            );
            return Ok(());
        }

        if let Some(ask) = &config.upgrade_confirm_callback
            && !ask("New version found")
        {
            info!("the user didn't confirm the upgrade");
            return Ok(());
        }

        let signature = config.source.get_signature().await?;
        let (stream, content_length) = config.source.get(Some(&reference)).await?;
        let stream =
            ProgressStream::new(stream, content_length, config.progress_callback.clone());

        let options = ApplyOptions {
            target_mode: Some(platform::DEFAULT_EXECUTABLE_MODE),
            public_key: Some(PublicKey::Ed25519(config.public_key)),
            signature: Some(signature.to_vec()),
            ..ApplyOptions::default()
        };
        state.executable = Some(apply(stream, options).await?);

        if let Some(ask) = &config.restart_confirm_callback
            && !ask()
        {
            info!("the user didn't confirm restarting after the upgrade");
            return Ok(());
        }

        restart_process(config.exit_callback.as_ref(), state.executable.clone())
    }

    /// Restart into the previously applied executable (or the resolved
    /// current one when no apply has happened yet). Useful for a
    /// restart-later policy after a declined restart confirmation.
    pub async fn restart(&self) -> Result<(), UpdateError> {
        let executable = self.shared.state.lock().await.executable.clone();
        restart_process(self.shared.config.exit_callback.as_ref(), executable)
    }

    /// Stop the background worker. Checks already in flight run to their
    /// next await point; no further scheduled checks fire. Manual
    /// [`check_now`](Updater::check_now) calls keep working.
    pub fn stop(&self) {
        if let Some(worker) = self.shared.worker.get() {
            worker.abort();
        }
    }
}

/// Set up an [`Updater`] for the current executable and start its background
/// worker.
///
/// Must be called from within a tokio runtime. The returned updater should
/// be kept alive for the process lifetime unless [`Updater::stop`] is used.
pub fn manage(config: Config) -> Result<Updater, UpdateError> {
    let updater = Updater {
        shared: Arc::new(Shared {
            config,
            state: Mutex::default(),
            worker: OnceLock::new(),
        }),
    };

    let worker = updater.clone();
    let handle = tokio::spawn(async move {
        if worker.shared.config.schedule.fetch_on_start {
            info!("doing an initial upgrade check");
            if let Err(err) = worker.check_now().await {
                error!("upgrade error: {err}");
            }
        }

        if worker.shared.config.schedule.has_recurring_trigger() {
            run_scheduler(worker).await;
        }
    });
    let _ = updater.shared.worker.set(handle.abort_handle());

    Ok(updater)
}

/// One-shot update: fetch and apply from `source` without scheduling,
/// confirmations or version comparison (the reference version is unknown, so
/// any published build is fetched).
pub async fn manual_update(
    source: &dyn Source,
    public_key: &VerifyingKey,
) -> Result<(), UpdateError> {
    let reference = Version::default();
    let (stream, _content_length) = source.get(Some(&reference)).await?;
    let signature = source.get_signature().await?;

    let options = ApplyOptions {
        target_mode: Some(platform::DEFAULT_EXECUTABLE_MODE),
        public_key: Some(PublicKey::Ed25519(*public_key)),
        signature: Some(signature.to_vec()),
        ..ApplyOptions::default()
    };
    apply(stream, options).await.map(|_| ())
}

async fn run_scheduler(updater: Updater) {
    loop {
        let schedule = &updater.shared.config.schedule;

        let mut delay = schedule.interval;
        if schedule.at.repeating != Repeating::None {
            let at = delay_until_next(schedule.at.repeating, &schedule.at.offset);
            if delay.is_none_or(|d| at < d) {
                delay = Some(at);
            }
        }
        let Some(delay) = delay else { return };

        tokio::time::sleep(delay).await;
        info!("scheduled upgrade check after {delay:?}");
        if let Err(err) = updater.check_now().await {
            error!("upgrade error: {err}");
        }
    }
}

fn restart_process(
    exit: Option<&ExitCallback>,
    executable: Option<PathBuf>,
) -> Result<(), UpdateError> {
    let spawned = spawn_replacement(executable);

    match exit {
        Some(callback) => {
            callback(spawned.as_ref().err());
            spawned.map(|_| ()).map_err(UpdateError::Spawn)
        }
        None => match spawned {
            Ok(_) => std::process::exit(0),
            Err(err) => Err(UpdateError::Spawn(err)),
        },
    }
}

/// Spawn a fresh process of `executable` with this process's arguments,
/// working directory, environment and stdio.
fn spawn_replacement(executable: Option<PathBuf>) -> io::Result<Child> {
    let executable = match executable {
        Some(path) => path,
        None => platform::current_exe_path()?,
    };
    let working_dir = std::env::current_dir()?;

    Command::new(executable)
        .args(std::env::args_os().skip(1))
        .current_dir(working_dir)
        .spawn()
}

fn format_date(version: &Version) -> String {
    version.date.map_or_else(|| "unknown".to_string(), |date| date.to_rfc2822())
}
