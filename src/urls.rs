use crate::config::ClientConfig;
use crate::error::{query_too_large, ClientResult};

/// Base URL for the project-scoped API: `https://<project>.<host>/v<version>`.
pub(crate) fn api_base(config: &ClientConfig) -> String {
    format!(
        "https://{}.{}/v{}",
        config.project_id, config.api_host, config.api_version
    )
}

/// Absolute URL for a logical data operation, e.g.
/// `…/data/listen/<dataset>?<query string>`.
pub(crate) fn data_url(config: &ClientConfig, operation: &str, query_string: &str) -> String {
    format!(
        "{}/data/{}/{}{}",
        api_base(config),
        operation,
        config.dataset,
        query_string
    )
}

/// Rejects URLs the listen endpoint's proxies would refuse. The limit counts
/// the configured header-overhead budget against the raw transport ceiling,
/// so the check is stricter than the URL length alone.
pub(crate) fn check_url_length(config: &ClientConfig, url: &str) -> ClientResult<()> {
    let limit = config.listen.effective_url_limit();
    if url.len() > limit {
        Err(query_too_large(format!(
            "query too large for listener: encoded URL is {} bytes, limit is {limit}",
            url.len()
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_project_scoped_listen_url() {
        let config = ClientConfig::new("demo", "blog");
        let url = data_url(&config, "listen", "?query=*");
        assert_eq!(
            url,
            "https://demo.api.contentlake.dev/v1/data/listen/blog?query=*"
        );
    }

    #[test]
    fn url_limit_accounts_for_header_overhead() {
        let mut config = ClientConfig::new("demo", "blog");
        config.listen.max_url_length = 120;
        config.listen.header_overhead = 100;
        assert!(check_url_length(&config, &"x".repeat(20)).is_ok());
        let err = check_url_length(&config, &"x".repeat(21)).unwrap_err();
        assert_eq!(err.code_str(), "client/query-too-large");
    }
}
