//! Static provider configuration.
//!
//! A [`ProviderRegistry`] is built once at startup and never mutated. Each
//! registered provider has one immutable [`ProviderConfig`] that is passed by
//! reference into every OAuth and fetch operation.

use std::collections::BTreeMap;
use std::fmt;

use calfuse_core::ProviderId;
use tracing::{debug, info};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::{google, outlook};

/// Environment variable prefix for all provider settings.
pub const ENV_PREFIX: &str = "CALFUSE";

/// OAuth and API endpoints plus client credentials for one provider.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Which provider this describes.
    pub id: ProviderId,
    /// Where the user is sent to grant consent.
    pub auth_endpoint: Url,
    /// Where authorization codes are exchanged for tokens.
    pub token_endpoint: Url,
    /// The event listing endpoint.
    pub events_endpoint: Url,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret. Redacted from `Debug` output.
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: Url,
    /// Scopes requested by default; also the upper bound for caller requests.
    pub scopes: Vec<String>,
    /// Additional authorization URL parameters (e.g. `access_type=offline`).
    pub extra_auth_params: Vec<(String, String)>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("auth_endpoint", &self.auth_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("events_endpoint", &self.events_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ProviderConfig {
    /// Creates a Google Calendar configuration with the public Google endpoints.
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: &str,
    ) -> ProviderResult<Self> {
        Ok(Self {
            id: ProviderId::Google,
            auth_endpoint: parse_url("auth endpoint", google::AUTH_ENDPOINT)?,
            token_endpoint: parse_url("token endpoint", google::TOKEN_ENDPOINT)?,
            events_endpoint: parse_url("events endpoint", google::EVENTS_ENDPOINT)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: parse_url("redirect URI", redirect_uri)?,
            scopes: google::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_auth_params: google::extra_auth_params(),
        })
    }

    /// Creates an Outlook (Microsoft Graph) configuration for the given tenant.
    pub fn outlook(
        tenant: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: &str,
    ) -> ProviderResult<Self> {
        Ok(Self {
            id: ProviderId::Outlook,
            auth_endpoint: parse_url("auth endpoint", &outlook::auth_endpoint(tenant))?,
            token_endpoint: parse_url("token endpoint", &outlook::token_endpoint(tenant))?,
            events_endpoint: parse_url("events endpoint", outlook::EVENTS_ENDPOINT)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: parse_url("redirect URI", redirect_uri)?,
            scopes: outlook::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_auth_params: outlook::extra_auth_params(),
        })
    }

    /// Builder method to override the authorization endpoint.
    pub fn with_auth_endpoint(mut self, url: Url) -> Self {
        self.auth_endpoint = url;
        self
    }

    /// Builder method to override the token endpoint.
    pub fn with_token_endpoint(mut self, url: Url) -> Self {
        self.token_endpoint = url;
        self
    }

    /// Builder method to override the events endpoint.
    pub fn with_events_endpoint(mut self, url: Url) -> Self {
        self.events_endpoint = url;
        self
    }

    /// Builder method to replace the scope set. Duplicates are dropped, order kept.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            if !scope.is_empty() && !unique.contains(&scope) {
                unique.push(scope);
            }
        }
        self.scopes = unique;
        self
    }

    /// Checks that every field required for the OAuth flow is present.
    pub fn validate(&self) -> ProviderResult<()> {
        let fail = |what: &str| {
            Err(ProviderError::configuration(format!("{what} must not be empty")).with_provider(self.id))
        };
        if self.client_id.trim().is_empty() {
            return fail("client_id");
        }
        if self.client_secret.trim().is_empty() {
            return fail("client_secret");
        }
        if self.scopes.is_empty() {
            return fail("scope");
        }
        for (name, url) in [
            ("auth endpoint", &self.auth_endpoint),
            ("token endpoint", &self.token_endpoint),
            ("events endpoint", &self.events_endpoint),
            ("redirect URI", &self.redirect_uri),
        ] {
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(ProviderError::configuration(format!(
                    "{name} must be an absolute http(s) URL"
                ))
                .with_provider(self.id));
            }
        }
        Ok(())
    }
}

fn parse_url(what: &str, value: &str) -> ProviderResult<Url> {
    Url::parse(value.trim())
        .map_err(|e| ProviderError::configuration(format!("invalid {what}: {e}")).with_source(e))
}

/// The set of configured providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, ProviderConfig>,
}

impl ProviderRegistry {
    /// Creates a registry from validated configurations.
    ///
    /// Fails if any config is invalid, if a provider appears twice, or if
    /// the list is empty.
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> ProviderResult<Self> {
        let mut providers = BTreeMap::new();
        for config in configs {
            config.validate()?;
            let id = config.id;
            if providers.insert(id, config).is_some() {
                return Err(ProviderError::configuration(format!(
                    "provider '{id}' configured more than once"
                )));
            }
        }
        if providers.is_empty() {
            return Err(ProviderError::configuration(
                "no calendar provider configured",
            ));
        }
        Ok(Self { providers })
    }

    /// Builds the registry from process environment variables.
    ///
    /// See [`ProviderRegistry::from_lookup`] for the variables read.
    pub fn from_env() -> ProviderResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the registry from a key/value lookup.
    ///
    /// For each provider `P` in `GOOGLE`, `OUTLOOK`:
    /// - `CALFUSE_P_CLIENT_ID`, `CALFUSE_P_CLIENT_SECRET`, `CALFUSE_P_REDIRECT_URI`
    ///   are required together; a provider with none of them is skipped.
    /// - `CALFUSE_P_AUTH_ENDPOINT`, `CALFUSE_P_TOKEN_ENDPOINT`,
    ///   `CALFUSE_P_EVENTS_ENDPOINT`, `CALFUSE_P_SCOPES` optionally override defaults.
    /// - `CALFUSE_OUTLOOK_TENANT` selects the Microsoft tenant (default `common`).
    pub fn from_lookup<F>(lookup: F) -> ProviderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |provider: ProviderId, key: &str| {
            let name = env_key(provider, key);
            lookup(&name).filter(|v| !v.trim().is_empty())
        };

        let mut configs = Vec::new();
        for provider in ProviderId::ALL {
            let client_id = get(provider, "CLIENT_ID");
            let client_secret = get(provider, "CLIENT_SECRET");
            let redirect_uri = get(provider, "REDIRECT_URI");

            let (client_id, client_secret, redirect_uri) =
                match (client_id, client_secret, redirect_uri) {
                    (None, None, None) => {
                        debug!(provider = %provider, "provider not configured, skipping");
                        continue;
                    }
                    (Some(id), Some(secret), Some(uri)) => (id, secret, uri),
                    (id, secret, uri) => {
                        let missing: Vec<_> = [
                            ("CLIENT_ID", id.is_none()),
                            ("CLIENT_SECRET", secret.is_none()),
                            ("REDIRECT_URI", uri.is_none()),
                        ]
                        .into_iter()
                        .filter(|(_, absent)| *absent)
                        .map(|(key, _)| env_key(provider, key))
                        .collect();
                        return Err(ProviderError::configuration(format!(
                            "incomplete configuration, missing {}",
                            missing.join(", ")
                        ))
                        .with_provider(provider));
                    }
                };

            let mut config = match provider {
                ProviderId::Google => ProviderConfig::google(client_id, client_secret, &redirect_uri)?,
                ProviderId::Outlook => {
                    let tenant = lookup(&format!("{ENV_PREFIX}_OUTLOOK_TENANT"))
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| outlook::DEFAULT_TENANT.to_string());
                    ProviderConfig::outlook(&tenant, client_id, client_secret, &redirect_uri)?
                }
            };

            if let Some(url) = get(provider, "AUTH_ENDPOINT") {
                config = config.with_auth_endpoint(parse_url("auth endpoint", &url)?);
            }
            if let Some(url) = get(provider, "TOKEN_ENDPOINT") {
                config = config.with_token_endpoint(parse_url("token endpoint", &url)?);
            }
            if let Some(url) = get(provider, "EVENTS_ENDPOINT") {
                config = config.with_events_endpoint(parse_url("events endpoint", &url)?);
            }
            if let Some(scopes) = get(provider, "SCOPES") {
                config = config.with_scopes(scopes.split_whitespace());
            }

            info!(provider = %provider, client_id = %config.client_id, "provider configured");
            configs.push(config);
        }

        Self::new(configs)
    }

    /// Looks up a provider's configuration.
    pub fn get(&self, id: ProviderId) -> ProviderResult<&ProviderConfig> {
        self.providers
            .get(&id)
            .ok_or_else(|| ProviderError::unknown_provider(id))
    }

    /// Looks up a provider by its wire name (`google`, `outlook`).
    pub fn get_by_name(&self, name: &str) -> ProviderResult<&ProviderConfig> {
        let id: ProviderId = name.parse()?;
        self.get(id)
    }

    /// Returns the registered provider ids in stable order.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }
}

fn env_key(provider: ProviderId, key: &str) -> String {
    format!("{}_{}_{}", ENV_PREFIX, provider.as_str().to_ascii_uppercase(), key)
}
