use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use visits_core::AccumMode;

/// Provider endpoint used when none is configured. `{uid}` is substituted.
pub const DEFAULT_VISIT_API_TEMPLATE: &str =
    "https://visit-api-by-digi.vercel.app/visit?uid={uid}&server_name=ind";

#[derive(Clone)]
pub struct DaemonConfig {
    /// Directory holding `tasks.json` and `settings.json`.
    pub data_dir: PathBuf,
    pub visit_api_template: String,
    /// Upper bound for one provider call, body included.
    pub request_timeout: Duration,
    /// Pause between two cycles of a background loop.
    pub poll_interval: Duration,
    /// Mode written into a freshly initialised settings document.
    pub default_accum_mode: AccumMode,
    /// Credential for list / sweep / set-mode. `None` rejects all admin calls.
    pub admin_pass: Option<String>,
    /// Run one in-process loop per running task.
    pub background_workers: bool,
}

impl DaemonConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            visit_api_template: DEFAULT_VISIT_API_TEMPLATE.to_string(),
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
            default_accum_mode: AccumMode::AddReports,
            admin_pass: None,
            background_workers: true,
        }
    }
}

impl fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("data_dir", &self.data_dir)
            .field("visit_api_template", &self.visit_api_template)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("default_accum_mode", &self.default_accum_mode)
            .field("admin_pass", &self.admin_pass.as_ref().map(|_| "<redacted>"))
            .field("background_workers", &self.background_workers)
            .finish()
    }
}
