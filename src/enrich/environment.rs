use crate::domain::EnvironmentSnapshot;
use chrono::Local;

/// Supplies device/runtime descriptors and the do-not-track signal.
///
/// Implementations are called synchronously on the tracking path and must
/// not block on I/O.
pub trait EnvironmentProvider: Send + Sync {
    fn snapshot(&self) -> EnvironmentSnapshot;

    fn do_not_track(&self) -> bool {
        false
    }
}

/// Describes the machine the host application runs on.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    app_version: Option<String>,
    do_not_track: bool,
}

impl HostEnvironment {
    /// Reads the `DO_NOT_TRACK` environment variable once.
    pub fn new() -> Self {
        let do_not_track = parse_do_not_track(std::env::var("DO_NOT_TRACK").ok().as_deref());
        Self {
            app_version: None,
            do_not_track,
        }
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProvider for HostEnvironment {
    fn snapshot(&self) -> EnvironmentSnapshot {
        let mut snapshot = EnvironmentSnapshot::new()
            .with("os", std::env::consts::OS)
            .with("arch", std::env::consts::ARCH)
            .with("family", std::env::consts::FAMILY)
            .with("pid", std::process::id())
            .with(
                "timezoneOffsetMinutes",
                Local::now().offset().local_minus_utc() / 60,
            );

        if let Ok(host) = hostname::get() {
            snapshot.insert("hostname", host.to_string_lossy().into_owned());
        }
        if let Ok(cpus) = std::thread::available_parallelism() {
            snapshot.insert("cpus", cpus.get());
        }
        if let Some(locale) = ["LC_ALL", "LANG"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        {
            snapshot.insert("locale", locale);
        }
        if let Some(version) = &self.app_version {
            snapshot.insert("appVersion", version.clone());
        }

        snapshot
    }

    fn do_not_track(&self) -> bool {
        self.do_not_track
    }
}

/// Fixed snapshot supplied by the host, for embedders that collect their own
/// device data.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    snapshot: EnvironmentSnapshot,
    do_not_track: bool,
}

impl StaticEnvironment {
    pub fn new(snapshot: EnvironmentSnapshot) -> Self {
        Self {
            snapshot,
            do_not_track: false,
        }
    }

    pub fn with_do_not_track(mut self, do_not_track: bool) -> Self {
        self.do_not_track = do_not_track;
        self
    }
}

impl EnvironmentProvider for StaticEnvironment {
    fn snapshot(&self) -> EnvironmentSnapshot {
        self.snapshot.clone()
    }

    fn do_not_track(&self) -> bool {
        self.do_not_track
    }
}

/// `DO_NOT_TRACK=1` convention; any other value (or none) means no signal.
pub fn parse_do_not_track(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}
