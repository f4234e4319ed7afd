use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://sis.rutgers.edu/soc/api";
pub const DEFAULT_USER_AGENT: &str = "BetterCourseSchedulePlanner/0.1 (+sample-fetcher)";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and how the SOC API is reached.
#[derive(Clone, Debug)]
pub struct SocConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SocConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<base_url>/<endpoint>.json`, tolerating a trailing slash on the base.
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}.json", self.base_url.trim_end_matches('/'), endpoint)
    }
}
