//! Routing subdomain patching of the staged master configuration.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::StartupResult;
use crate::master_config::MasterConfig;
use crate::stager::{ConfigStager, StagedConfig};

/// Default wildcard DNS suffix for derived routing subdomains.
pub const DEFAULT_WILDCARD_DNS_SUFFIX: &str = "xip.io";

/// Chooses the routing subdomain: the explicit suffix when non-empty,
/// otherwise `<server_ip>.<wildcard_suffix>`.
pub fn routing_subdomain(explicit: Option<&str>, server_ip: &str, wildcard_suffix: &str) -> String {
    match explicit {
        Some(suffix) if !suffix.is_empty() => suffix.to_string(),
        _ => format!("{}.{}", server_ip, wildcard_suffix),
    }
}

/// Rewrites the routing subdomain of the staged master configuration and
/// commits the file back to the host.
pub struct ConfigPatcher<'a> {
    stager: &'a ConfigStager,
    routing_suffix: Option<&'a str>,
    wildcard_suffix: &'a str,
}

impl<'a> ConfigPatcher<'a> {
    pub fn new(stager: &'a ConfigStager, routing_suffix: Option<&'a str>, wildcard_suffix: &'a str) -> Self {
        Self {
            stager,
            routing_suffix,
            wildcard_suffix,
        }
    }

    /// Patches `staged` in place, then copies the master configuration back
    /// under `host_dir`. Returns the subdomain that was written.
    #[instrument(skip(self, staged), fields(staged = %staged.path().display()))]
    pub async fn patch(
        &self,
        staged: &StagedConfig,
        host_dir: &Path,
        server_ip: &str,
    ) -> StartupResult<String> {
        let path = staged.master_config();
        debug!(path = %path.display(), "Reading master config");
        let mut cfg = MasterConfig::load(&path).await?;

        let subdomain = routing_subdomain(self.routing_suffix, server_ip, self.wildcard_suffix);
        cfg.set_routing_subdomain(&subdomain);
        cfg.save(&path).await?;
        info!(subdomain = %subdomain, "Updated routing subdomain");

        self.stager.commit(staged, &path, host_dir).await?;
        Ok(subdomain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_suffix_wins() {
        assert_eq!(
            routing_subdomain(Some("apps.example.com"), "10.0.0.5", DEFAULT_WILDCARD_DNS_SUFFIX),
            "apps.example.com"
        );
    }

    #[test]
    fn test_derived_from_ip() {
        assert_eq!(
            routing_subdomain(None, "10.0.0.5", DEFAULT_WILDCARD_DNS_SUFFIX),
            "10.0.0.5.xip.io"
        );
        assert_eq!(routing_subdomain(Some(""), "10.0.0.5", "nip.io"), "10.0.0.5.nip.io");
    }
}
