use std::time::Duration;

use crate::error::{invalid_config, invalid_tag, ClientResult};

/// Hard ceiling on the request line accepted by the listen endpoint's
/// front-end proxies.
pub const MAX_URL_LENGTH: usize = 16_000;

/// Estimated worst-case header overhead counted against [`MAX_URL_LENGTH`].
pub const HEADER_OVERHEAD_BYTES: usize = 1_200;

/// Delay before reopening a listen connection after the transport reports a
/// fully closed state.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

const DEFAULT_API_HOST: &str = "api.contentlake.dev";
const DEFAULT_API_VERSION: &str = "1";
const MAX_TAG_SEGMENT_LENGTH: usize = 75;

/// Connection options for a content lake project.
///
/// Mirrors the configuration object accepted by the hosted service's
/// JavaScript client: all fields are plain data, and a [`crate::Client`]
/// validates them once at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Project identifier, used as the leftmost host label.
    pub project_id: String,
    /// Dataset the listener is scoped to.
    pub dataset: String,
    /// API host the project-specific hostname is built on.
    pub api_host: String,
    /// API version segment (`/v<version>/…`).
    pub api_version: String,
    /// Bearer token sent with the listen request when present.
    pub token: Option<String>,
    /// Ask the transport for credentialed mode even without a token.
    pub with_credentials: bool,
    /// Prefix joined onto every request tag with a `.` separator.
    pub request_tag_prefix: Option<String>,
    /// Tuning knobs for the listen connection.
    pub listen: ListenSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: String::new(),
            api_host: DEFAULT_API_HOST.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            token: None,
            with_credentials: false,
            request_tag_prefix: None,
            listen: ListenSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            ..Default::default()
        }
    }
}

/// Listen-connection tuning.
///
/// The defaults were calibrated against the hosted deployment's header
/// budget and the reconnection behaviour of browser EventSource
/// implementations; override them only when fronting a different proxy
/// stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenSettings {
    pub reconnect_delay: Duration,
    pub max_url_length: usize,
    pub header_overhead: usize,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_url_length: MAX_URL_LENGTH,
            header_overhead: HEADER_OVERHEAD_BYTES,
        }
    }
}

impl ListenSettings {
    /// Longest URL the listen endpoint will accept once header overhead is
    /// budgeted for.
    pub fn effective_url_limit(&self) -> usize {
        self.max_url_length.saturating_sub(self.header_overhead)
    }
}

pub(crate) fn validate_config(config: &ClientConfig) -> ClientResult<()> {
    validate_project_id(&config.project_id)?;
    validate_dataset(&config.dataset)?;
    if let Some(prefix) = &config.request_tag_prefix {
        validate_tag(prefix)?;
    }
    if config.api_host.is_empty() {
        return Err(invalid_config("apiHost must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_project_id(project_id: &str) -> ClientResult<()> {
    let ok = !project_id.is_empty()
        && project_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(invalid_config(format!(
            "invalid project id \"{project_id}\": only lowercase letters, digits and dashes are allowed"
        )))
    }
}

pub(crate) fn validate_dataset(dataset: &str) -> ClientResult<()> {
    let ok = !dataset.is_empty()
        && dataset.len() <= 64
        && dataset
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(invalid_config(format!(
            "invalid dataset name \"{dataset}\": use up to 64 lowercase letters, digits, underscores or dashes"
        )))
    }
}

/// Request tags are dot-separated segments of `[a-zA-Z0-9._-]`, each at most
/// 75 characters.
pub(crate) fn validate_tag(tag: &str) -> ClientResult<()> {
    let valid_segment = |segment: &str| {
        !segment.is_empty()
            && segment.len() <= MAX_TAG_SEGMENT_LENGTH
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    if !tag.is_empty() && tag.split('.').all(valid_segment) {
        Ok(())
    } else {
        Err(invalid_tag(format!(
            "invalid request tag \"{tag}\": tags must be dot-separated segments of letters, digits, underscores and dashes"
        )))
    }
}

/// Joins the configured tag prefix with a per-request tag, when either is
/// present.
pub(crate) fn resolve_tag(config: &ClientConfig, tag: Option<&str>) -> ClientResult<Option<String>> {
    let Some(tag) = tag else {
        return Ok(None);
    };
    validate_tag(tag)?;
    let resolved = match &config.request_tag_prefix {
        Some(prefix) => format!("{prefix}.{tag}"),
        None => tag.to_owned(),
    };
    Ok(Some(resolved))
}
