//! Options for opening archives.

use crate::password::Password;

/// Default backwards-search budget for recovery mode (1 MiB).
pub const DEFAULT_RECOVERY_SEARCH_LIMIT: u64 = 1024 * 1024;

/// Options controlling how an archive is opened and read.
///
/// # Example
///
/// ```rust
/// use sieben::read::ReaderOptions;
///
/// let options = ReaderOptions::new()
///     .max_memory_limit_kib(64 * 1024)
///     .recover_broken_archives(true);
/// ```
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub(crate) password: Option<Password>,
    pub(crate) max_memory_limit_kib: u64,
    pub(crate) default_name: Option<String>,
    pub(crate) use_default_name_for_unnamed_entries: bool,
    pub(crate) recover_broken_archives: bool,
    pub(crate) recovery_search_limit: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            password: None,
            max_memory_limit_kib: u64::MAX,
            default_name: None,
            use_default_name_for_unnamed_entries: false,
            recover_broken_archives: false,
            recovery_search_limit: DEFAULT_RECOVERY_SEARCH_LIMIT,
        }
    }
}

impl ReaderOptions {
    /// Creates options with defaults: no password, no memory limit, no
    /// default name substitution, recovery disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password for encrypted archives.
    pub fn password(mut self, password: Password) -> Self {
        self.password = Some(password);
        self
    }

    /// Rejects archives whose header-parse memory estimate exceeds this
    /// many KiB.
    pub fn max_memory_limit_kib(mut self, limit: u64) -> Self {
        self.max_memory_limit_kib = limit;
        self
    }

    /// Name to report for entries stored without one (when enabled with
    /// [`use_default_name_for_unnamed_entries`][Self::use_default_name_for_unnamed_entries]).
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Substitutes the configured default name for unnamed entries during
    /// sequential reading.
    pub fn use_default_name_for_unnamed_entries(mut self, enabled: bool) -> Self {
        self.use_default_name_for_unnamed_entries = enabled;
        self
    }

    /// Scans backwards for an end header when the start header is zeroed
    /// out (truncated multi-volume archives).
    ///
    /// Most useful together with a tight
    /// [`max_memory_limit_kib`][Self::max_memory_limit_kib], since the scan
    /// tries to parse arbitrary byte positions as headers.
    pub fn recover_broken_archives(mut self, enabled: bool) -> Self {
        self.recover_broken_archives = enabled;
        self
    }

    /// How far back from the end of the file recovery scans for a header
    /// byte. Defaults to 1 MiB.
    pub fn recovery_search_limit(mut self, limit: u64) -> Self {
        self.recovery_search_limit = limit;
        self
    }
}
