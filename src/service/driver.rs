//! Driver subprocess spawn, readiness poll and teardown.
//!
//! A [`DriverService`] owns at most one OS process at a time. The service
//! moves through [`ServiceState`] under its own lifecycle lock, so
//! concurrent `start` and `kill` calls serialize without the caller
//! holding any external lock.
//!
//! # Example
//!
//! ```no_run
//! use webdriver_remote::service::DriverService;
//!
//! # async fn example() -> webdriver_remote::Result<()> {
//! let service = DriverService::builder("chromedriver")
//!     .download_url("https://chromedriver.chromium.org/downloads")
//!     .build()?;
//!
//! let address = service.start().await?;
//! // ... drive the endpoint at `address` ...
//! service.kill().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::process::{Child, Command as ProcessCommand};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::port::free_port;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the readiness poll.
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between readiness probes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-request timeout of one readiness probe.
const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Fallback shown when no download source was configured.
const DEFAULT_DOWNLOAD_URL: &str = "your browser vendor's driver release page";

// ============================================================================
// ServiceState
// ============================================================================

/// Observable lifecycle state of a [`DriverService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No subprocess exists.
    Stopped,
    /// Subprocess spawned, readiness poll in progress.
    Starting,
    /// Subprocess answered its status check; address is bound.
    Running,
    /// Termination in progress.
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

// ============================================================================
// DriverServiceBuilder
// ============================================================================

/// Builder for configuring a [`DriverService`].
///
/// Use [`DriverService::builder`] to create one. Executable discovery
/// happens in [`DriverServiceBuilder::build`], so a missing driver binary
/// surfaces as a configuration error before anything is spawned.
#[derive(Debug, Clone)]
pub struct DriverServiceBuilder {
    /// Executable name searched on PATH (platform suffix applied).
    executable_name: String,
    /// Explicit executable path, bypassing the PATH search.
    executable: Option<PathBuf>,
    /// Fixed port; probed when absent.
    port: Option<u16>,
    /// Extra arguments appended after the port argument.
    args: Vec<String>,
    /// Port argument template containing a `{port}` placeholder.
    port_arg: String,
    /// Interface the subprocess binds.
    bind_address: IpAddr,
    /// Bound on the readiness poll.
    readiness_timeout: Duration,
    /// Whether the subprocess inherits this process's stdio.
    inherit_stdio: bool,
    /// Download source named in the not-found message.
    download_url: Option<String>,
}

impl DriverServiceBuilder {
    /// Creates a builder for the named driver executable.
    #[must_use]
    pub fn new(executable_name: impl Into<String>) -> Self {
        Self {
            executable_name: executable_name.into(),
            executable: None,
            port: None,
            args: Vec::new(),
            port_arg: "--port={port}".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            inherit_stdio: false,
            download_url: None,
        }
    }

    /// Uses an explicit executable path instead of searching PATH.
    #[inline]
    #[must_use]
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Pins the endpoint port instead of probing a free one.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Appends one argument to the subprocess command line.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments to the subprocess command line.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overrides the port argument template.
    ///
    /// The template must contain a `{port}` placeholder, e.g.
    /// `"-p {port}"` becomes two arguments split on whitespace.
    #[inline]
    #[must_use]
    pub fn port_arg(mut self, template: impl Into<String>) -> Self {
        self.port_arg = template.into();
        self
    }

    /// Overrides the interface the endpoint binds.
    ///
    /// Loopback is the default; anything else makes the endpoint
    /// reachable from outside the local host.
    #[inline]
    #[must_use]
    pub fn bind_address(mut self, ip: IpAddr) -> Self {
        self.bind_address = ip;
        self
    }

    /// Sets the bound on the readiness poll.
    #[inline]
    #[must_use]
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Lets the subprocess write to this process's stdout/stderr.
    #[inline]
    #[must_use]
    pub fn inherit_stdio(mut self, inherit: bool) -> Self {
        self.inherit_stdio = inherit;
        self
    }

    /// Names the download source in the executable-not-found message.
    #[inline]
    #[must_use]
    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Builds the service, resolving the executable.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutableNotFound`] if the binary is absent from PATH
    ///   (or the explicit path does not exist), naming the download source
    /// - [`Error::InvalidArgument`] if the port argument template has no
    ///   `{port}` placeholder
    pub fn build(self) -> Result<DriverService> {
        if !self.port_arg.contains("{port}") {
            return Err(Error::invalid_argument(format!(
                "port argument template '{}' has no {{port}} placeholder",
                self.port_arg
            )));
        }

        let name = platform_executable_name(&self.executable_name);
        let download_url = self
            .download_url
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_URL.to_string());

        let executable = match self.executable {
            Some(path) if path.is_file() => path,
            Some(path) => {
                return Err(Error::executable_not_found(
                    path.display().to_string(),
                    download_url,
                ));
            }
            None => find_on_path(&name)
                .ok_or_else(|| Error::executable_not_found(&name, download_url))?,
        };

        debug!(executable = %executable.display(), "driver executable resolved");

        Ok(DriverService {
            executable,
            port: self.port,
            args: self.args,
            port_arg: self.port_arg,
            bind_address: self.bind_address,
            readiness_timeout: self.readiness_timeout,
            inherit_stdio: self.inherit_stdio,
            client: Client::new(),
            state: Mutex::new(ServiceState::Stopped),
            lifecycle: tokio::sync::Mutex::new(None),
        })
    }
}

// ============================================================================
// Executable Discovery
// ============================================================================

/// Applies the platform executable suffix.
fn platform_executable_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Searches the process's executable search path for the named binary.
fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;

    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// RunningEndpoint
// ============================================================================

/// Subprocess handle plus the address it is serving.
struct RunningEndpoint {
    /// The driver subprocess. Never leaves this module.
    child: Child,
    /// Endpoint base URL.
    url: Url,
}

// ============================================================================
// DriverService
// ============================================================================

/// Manages the subprocess that implements the wire protocol endpoint.
///
/// At most one subprocess is associated with a service instance at a
/// time. `start` and `kill` serialize through the internal lifecycle
/// lock; [`DriverService::state`] and [`DriverService::is_running`] are
/// cheap observers that never touch it.
pub struct DriverService {
    /// Resolved executable path.
    executable: PathBuf,
    /// Fixed port; probed per start when absent.
    port: Option<u16>,
    /// Extra subprocess arguments.
    args: Vec<String>,
    /// Port argument template.
    port_arg: String,
    /// Interface the subprocess binds.
    bind_address: IpAddr,
    /// Bound on the readiness poll.
    readiness_timeout: Duration,
    /// Whether the subprocess inherits stdio.
    inherit_stdio: bool,
    /// Client for readiness probes.
    client: Client,
    /// Observable state, updated as the lifecycle progresses.
    state: Mutex<ServiceState>,
    /// Lifecycle lock owning the subprocess handle. Single-flight:
    /// a second concurrent `start` waits here, then observes RUNNING.
    lifecycle: tokio::sync::Mutex<Option<RunningEndpoint>>,
}

impl fmt::Debug for DriverService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverService")
            .field("executable", &self.executable)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DriverService {
    /// Creates a configuration builder for the named driver executable.
    #[inline]
    #[must_use]
    pub fn builder(executable_name: impl Into<String>) -> DriverServiceBuilder {
        DriverServiceBuilder::new(executable_name)
    }

    /// Returns the resolved executable path.
    #[inline]
    #[must_use]
    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Returns `true` while a ready subprocess is owned.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Starts the subprocess and waits until the endpoint answers.
    ///
    /// A no-op returning the already-bound address when the service is
    /// running. Concurrent calls spawn exactly one subprocess: the second
    /// caller waits on the lifecycle lock and then observes the first
    /// caller's result.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessLaunch`] if the spawn fails or the subprocess
    ///   exits during startup
    /// - [`Error::StartupTimeout`] if the endpoint never answers; any
    ///   partially-started subprocess is killed first
    pub async fn start(&self) -> Result<Url> {
        let mut guard = self.lifecycle.lock().await;

        if let Some(endpoint) = guard.as_ref() {
            debug!(url = %endpoint.url, "service already running");
            return Ok(endpoint.url.clone());
        }

        *self.state.lock() = ServiceState::Starting;

        match self.spawn_and_poll().await {
            Ok(endpoint) => {
                let url = endpoint.url.clone();
                *guard = Some(endpoint);
                *self.state.lock() = ServiceState::Running;

                info!(%url, "driver service ready");
                Ok(url)
            }
            Err(e) => {
                *self.state.lock() = ServiceState::Stopped;
                Err(e)
            }
        }
    }

    /// Terminates the subprocess.
    ///
    /// Idempotent: a no-op when nothing is running. The state always ends
    /// at [`ServiceState::Stopped`], whether or not the subprocess exited
    /// cleanly.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for platforms
    /// where process-group teardown can fail.
    pub async fn kill(&self) -> Result<()> {
        let mut guard = self.lifecycle.lock().await;

        let Some(mut endpoint) = guard.take() else {
            *self.state.lock() = ServiceState::Stopped;
            return Ok(());
        };

        *self.state.lock() = ServiceState::Stopping;
        debug!(url = %endpoint.url, "killing driver subprocess");

        if let Err(e) = endpoint.child.kill().await {
            warn!(error = %e, "driver subprocess kill reported an error");
        }

        // Reap regardless of how the kill went.
        let _ = endpoint.child.wait().await;

        *self.state.lock() = ServiceState::Stopped;
        info!("driver service stopped");

        Ok(())
    }

    /// Spawns the subprocess and polls the endpoint until ready.
    async fn spawn_and_poll(&self) -> Result<RunningEndpoint> {
        let port = match self.port {
            Some(port) => port,
            None => free_port(self.bind_address).await?,
        };

        let url: Url = format!("http://{}:{}", self.bind_address, port)
            .parse()
            .map_err(|e| Error::invalid_argument(format!("endpoint address: {e}")))?;

        let mut child = self.spawn(port)?;

        debug!(
            executable = %self.executable.display(),
            port,
            "driver subprocess spawned"
        );

        let deadline = Instant::now() + self.readiness_timeout;
        let status_url = format!("{url}status");

        loop {
            // A subprocess that died during startup fails fast instead of
            // waiting out the whole readiness timeout.
            if let Some(exit) = child.try_wait()? {
                return Err(Error::ProcessLaunch {
                    message: format!("driver exited during startup with {exit}"),
                });
            }

            if self.probe_status(&status_url).await {
                return Ok(RunningEndpoint { child, url });
            }

            if Instant::now() >= deadline {
                warn!(timeout_ms = self.readiness_timeout.as_millis() as u64, "readiness poll timed out");

                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill unready subprocess");
                }
                let _ = child.wait().await;

                return Err(Error::startup_timeout(
                    self.readiness_timeout.as_millis() as u64
                ));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Spawns the subprocess with the port substituted into its argv.
    fn spawn(&self, port: u16) -> Result<Child> {
        let mut cmd = ProcessCommand::new(&self.executable);

        for arg in self.port_arg.split_whitespace() {
            cmd.arg(arg.replace("{port}", &port.to_string()));
        }
        cmd.args(&self.args);

        if self.inherit_stdio {
            cmd.stdin(Stdio::null());
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        cmd.kill_on_drop(true);

        cmd.spawn().map_err(Error::process_launch)
    }

    /// One readiness probe against the endpoint's status resource.
    ///
    /// A well-formed non-2xx answer counts as not ready; the poll
    /// continues until the deadline.
    async fn probe_status(&self, status_url: &str) -> bool {
        match self
            .client
            .get(status_url)
            .timeout(STATUS_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

impl Drop for DriverService {
    fn drop(&mut self) {
        // Best-effort teardown for services dropped without kill().
        if let Ok(mut guard) = self.lifecycle.try_lock()
            && let Some(endpoint) = guard.as_mut()
            && let Err(e) = endpoint.child.start_kill()
        {
            warn!(error = %e, "failed to kill driver subprocess on drop");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_executable_name() {
        let name = platform_executable_name("chromedriver");
        if cfg!(windows) {
            assert_eq!(name, "chromedriver.exe");
        } else {
            assert_eq!(name, "chromedriver");
        }
    }

    #[test]
    fn test_platform_suffix_not_doubled() {
        if cfg!(windows) {
            assert_eq!(
                platform_executable_name("chromedriver.exe"),
                "chromedriver.exe"
            );
        }
    }

    #[test]
    fn test_missing_executable_names_download_source() {
        let err = DriverService::builder("definitely-not-a-real-driver")
            .download_url("https://example.com/downloads")
            .build()
            .expect_err("must fail discovery");

        let text = err.to_string();
        assert!(matches!(err, Error::ExecutableNotFound { .. }));
        assert!(text.contains("definitely-not-a-real-driver"));
        assert!(text.contains("https://example.com/downloads"));
    }

    #[test]
    fn test_explicit_executable_must_exist() {
        let err = DriverService::builder("anydriver")
            .executable("/nonexistent/path/anydriver")
            .build()
            .expect_err("must fail discovery");

        assert!(matches!(err, Error::ExecutableNotFound { .. }));
    }

    #[test]
    fn test_port_arg_requires_placeholder() {
        let err = DriverService::builder("anydriver")
            .port_arg("--port=4444")
            .build()
            .expect_err("must reject template");

        assert!(err.is_usage());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        /// Writes an executable shell script and returns its path.
        fn fake_driver(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod script");
            path
        }

        /// Service whose fake subprocess never serves anything; readiness
        /// is answered by the mock endpoint on the pinned port.
        fn service_against(server: &MockServer, script: PathBuf) -> DriverService {
            let port = server.address().port();
            DriverService::builder("fake-driver")
                .executable(script)
                .port(port)
                .readiness_timeout(Duration::from_secs(5))
                .build()
                .expect("build service")
        }

        async fn ready_endpoint() -> MockServer {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/status"))
                .respond_with(ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({"value": {"ready": true}}),
                ))
                .mount(&server)
                .await;
            server
        }

        #[tokio::test]
        async fn test_kill_never_started_is_noop() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = fake_driver(dir.path(), "fake-driver", "exec sleep 30");
            let service = DriverService::builder("fake-driver")
                .executable(script)
                .build()
                .expect("build service");

            service.kill().await.expect("first kill");
            service.kill().await.expect("second kill");
            assert_eq!(service.state(), ServiceState::Stopped);
        }

        #[tokio::test]
        async fn test_start_spawns_and_kill_stops() {
            let dir = tempfile::tempdir().expect("tempdir");
            let counter = dir.path().join("spawn-count");
            let script = fake_driver(
                dir.path(),
                "fake-driver",
                &format!("echo spawned >> {}\nexec sleep 30", counter.display()),
            );

            let server = ready_endpoint().await;
            let service = service_against(&server, script);

            let url = service.start().await.expect("start");
            assert!(service.is_running());
            assert_eq!(url.port(), Some(server.address().port()));

            service.kill().await.expect("kill");
            assert_eq!(service.state(), ServiceState::Stopped);
            assert!(!service.is_running());

            let spawns = fs::read_to_string(&counter).expect("counter file");
            assert_eq!(spawns.lines().count(), 1);
        }

        #[tokio::test]
        async fn test_start_is_noop_while_running() {
            let dir = tempfile::tempdir().expect("tempdir");
            let counter = dir.path().join("spawn-count");
            let script = fake_driver(
                dir.path(),
                "fake-driver",
                &format!("echo spawned >> {}\nexec sleep 30", counter.display()),
            );

            let server = ready_endpoint().await;
            let service = service_against(&server, script);

            let first = service.start().await.expect("first start");
            let second = service.start().await.expect("second start");
            assert_eq!(first, second);

            let spawns = fs::read_to_string(&counter).expect("counter file");
            assert_eq!(spawns.lines().count(), 1);

            service.kill().await.expect("kill");
        }

        #[tokio::test]
        async fn test_single_flight_concurrent_starts() {
            let dir = tempfile::tempdir().expect("tempdir");
            let counter = dir.path().join("spawn-count");
            let script = fake_driver(
                dir.path(),
                "fake-driver",
                &format!("echo spawned >> {}\nexec sleep 30", counter.display()),
            );

            let server = ready_endpoint().await;
            let service = std::sync::Arc::new(service_against(&server, script));

            let a = std::sync::Arc::clone(&service);
            let b = std::sync::Arc::clone(&service);
            let (first, second) =
                tokio::join!(async move { a.start().await }, async move { b.start().await });

            assert_eq!(first.expect("first"), second.expect("second"));

            let spawns = fs::read_to_string(&counter).expect("counter file");
            assert_eq!(spawns.lines().count(), 1, "exactly one subprocess spawned");

            service.kill().await.expect("kill");
        }

        #[tokio::test]
        async fn test_startup_timeout_kills_subprocess() {
            let dir = tempfile::tempdir().expect("tempdir");
            let pid_file = dir.path().join("pid");
            // Nothing ever answers on the probed port.
            let script = fake_driver(
                dir.path(),
                "fake-driver",
                &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
            );

            let service = DriverService::builder("fake-driver")
                .executable(script)
                .readiness_timeout(Duration::from_millis(300))
                .build()
                .expect("build service");

            let err = service.start().await.expect_err("must time out");
            assert!(matches!(err, Error::StartupTimeout { .. }));
            assert_eq!(service.state(), ServiceState::Stopped);

            // The partially-started subprocess was reaped, not orphaned.
            let pid = fs::read_to_string(&pid_file)
                .expect("pid file")
                .trim()
                .to_string();
            let alive = std::process::Command::new("kill")
                .args(["-0", &pid])
                .status()
                .expect("probe")
                .success();
            assert!(!alive, "subprocess {pid} still alive after timeout");
        }

        #[tokio::test]
        async fn test_early_exit_fails_fast() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = fake_driver(dir.path(), "fake-driver", "exit 3");

            let service = DriverService::builder("fake-driver")
                .executable(script)
                .readiness_timeout(Duration::from_secs(30))
                .build()
                .expect("build service");

            let started = Instant::now();
            let err = service.start().await.expect_err("must fail");

            assert!(matches!(err, Error::ProcessLaunch { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert_eq!(service.state(), ServiceState::Stopped);
        }
    }
}
