//! Connection options
//!
//! Timeouts, user agent, TLS protocols and the upstream HTTP and SOCKS proxies,
//! persisted under `network.connection`.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::local_server::{filter_unsupported_protocols, supported_protocols, validate_protocols};
use super::{parse_port, HttpProxy, HttpProxyExclusion, PasswordAuthentication, SocksProxy, SocksVersion};
use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};
use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: i32 = 20;
pub const DEFAULT_DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:100.0) Gecko/20100101 Firefox/100.0";
pub const DNS_DEFAULT_TTL_SUCCESSFUL_QUERIES: i32 = 30;

const CURRENT_CONFIG_VERSION: i32 = 1;
const BASE_KEY: &str = "network.connection";
const CONFIG_VERSION_KEY: &str = "network.connection[@version]";

const TIMEOUT_KEY: &str = "network.connection.timeoutInSecs";
const DEFAULT_USER_AGENT_KEY: &str = "network.connection.defaultUserAgent";
const USE_GLOBAL_HTTP_STATE_KEY: &str = "network.connection.useGlobalHttpState";
const DNS_TTL_SUCCESSFUL_QUERIES_KEY: &str = "network.connection.dnsTtlSuccessfulQueries";

const TLS_PROTOCOL_KEY: &str = "network.connection.tlsProtocols.protocol";
const TLS_ALLOW_UNSAFE_RENEGOTIATION: &str = "network.connection.tlsProtocols.allowUnsafeRenegotiation";

const HTTP_PROXY_ENABLED_KEY: &str = "network.connection.httpProxy.enabled";
const HTTP_PROXY_HOST_KEY: &str = "network.connection.httpProxy.host";
const HTTP_PROXY_PORT_KEY: &str = "network.connection.httpProxy.port";
const HTTP_PROXY_AUTH_ENABLED_KEY: &str = "network.connection.httpProxy.authEnabled";
const STORE_HTTP_PROXY_PASS_KEY: &str = "network.connection.httpProxy.storePass";
const HTTP_PROXY_REALM_KEY: &str = "network.connection.httpProxy.realm";
const HTTP_PROXY_USERNAME_KEY: &str = "network.connection.httpProxy.username";
const HTTP_PROXY_PASSWORD_KEY: &str = "network.connection.httpProxy.password";

const HTTP_PROXY_EXCLUSION_KEY: &str = "network.connection.httpProxy.exclusions.exclusion";
const HTTP_PROXY_EXCLUSION_HOST_KEY: &str = "host";
const HTTP_PROXY_EXCLUSION_ENABLED_KEY: &str = "enabled";
const HTTP_PROXY_EXCLUSIONS_CONFIRM_REMOVE: &str =
    "network.connection.httpProxy.exclusions.confirmRemove";

const SOCKS_PROXY_ENABLED_KEY: &str = "network.connection.socksProxy.enabled";
const SOCKS_PROXY_HOST_KEY: &str = "network.connection.socksProxy.host";
const SOCKS_PROXY_PORT_KEY: &str = "network.connection.socksProxy.port";
const SOCKS_PROXY_VERSION_KEY: &str = "network.connection.socksProxy.version";
const SOCKS_PROXY_DNS_KEY: &str = "network.connection.socksProxy.dns";
const SOCKS_PROXY_USERNAME_KEY: &str = "network.connection.socksProxy.username";
const SOCKS_PROXY_PASSWORD_KEY: &str = "network.connection.socksProxy.password";

/// Hosts always resolved locally, even when the SOCKS proxy resolves names
fn loopback_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:localhost|127\..*|\[::1\]|0\.0\.0\.0|\[::0\])$")
            .expect("Invalid loopback regex")
    })
}

/// Called after the connection options change
pub type ChangeListener = Arc<dyn Fn(&ConnectionOptions) + Send + Sync>;

/// Options of outgoing connections
pub struct ConnectionOptions {
    config: SharedConfig,
    change_listeners: Vec<ChangeListener>,

    timeout_in_secs: i32,
    default_user_agent: String,
    use_global_http_state: bool,
    dns_ttl_successful_queries: i32,
    tls_protocols: Vec<String>,
    allow_unsafe_renegotiation: bool,

    http_proxy_enabled: bool,
    http_proxy: HttpProxy,
    http_proxy_auth_enabled: bool,
    store_http_proxy_pass: bool,
    http_proxy_exclusions: Vec<HttpProxyExclusion>,
    confirm_remove_http_proxy_exclusion: bool,

    socks_proxy_enabled: bool,
    socks_proxy: SocksProxy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            change_listeners: Vec::new(),
            timeout_in_secs: DEFAULT_TIMEOUT,
            default_user_agent: DEFAULT_DEFAULT_USER_AGENT.to_string(),
            use_global_http_state: false,
            dns_ttl_successful_queries: DNS_DEFAULT_TTL_SUCCESSFUL_QUERIES,
            tls_protocols: supported_protocols(),
            allow_unsafe_renegotiation: false,
            http_proxy_enabled: false,
            http_proxy: HttpProxy::default(),
            http_proxy_auth_enabled: false,
            store_http_proxy_pass: true,
            http_proxy_exclusions: Vec::new(),
            confirm_remove_http_proxy_exclusion: true,
            socks_proxy_enabled: false,
            socks_proxy: SocksProxy::default(),
        }
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("timeout_in_secs", &self.timeout_in_secs)
            .field("http_proxy_enabled", &self.http_proxy_enabled)
            .field("socks_proxy_enabled", &self.socks_proxy_enabled)
            .finish_non_exhaustive()
    }
}

/// Move a legacy value to its new key
fn migrate(tree: &mut ConfigTree, old_key: &str, new_key: &str) {
    if let Some(value) = tree.get_string(old_key) {
        tree.set_property(new_key, value);
        tree.clear_property(old_key);
    }
}

impl VersionedOptions for ConnectionOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, tree: &mut ConfigTree, _from_version: i32) {
        migrate(tree, "connection.timeoutInSecs", TIMEOUT_KEY);
        migrate(tree, "connection.defaultUserAgent", DEFAULT_USER_AGENT_KEY);
        migrate(tree, "connection.httpStateEnabled", USE_GLOBAL_HTTP_STATE_KEY);
        migrate(tree, "connection.dnsTtlSuccessfulQueries", DNS_TTL_SUCCESSFUL_QUERIES_KEY);

        let protocols: Vec<String> = tree
            .get_list("connection.securityProtocolsEnabled.protocol")
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if !protocols.is_empty() {
            let protocols = filter_unsupported_protocols(protocols);
            if protocols.is_empty() {
                tracing::warn!("No supported TLS protocols to migrate");
            } else {
                tree.set_list(TLS_PROTOCOL_KEY, &protocols);
            }
        }
        migrate(tree, "certificate.allowUnsafeSslRenegotiation", TLS_ALLOW_UNSAFE_RENEGOTIATION);

        migrate(tree, "connection.proxyChain.enabled", HTTP_PROXY_ENABLED_KEY);
        migrate(tree, "connection.proxyChain.hostName", HTTP_PROXY_HOST_KEY);
        migrate(tree, "connection.proxyChain.port", HTTP_PROXY_PORT_KEY);
        migrate(tree, "connection.proxyChain.authEnabled", HTTP_PROXY_AUTH_ENABLED_KEY);
        if let Some(prompt) = tree.get_string("connection.proxyChain.prompt") {
            let prompt = prompt.trim().eq_ignore_ascii_case("true");
            tree.set_property(STORE_HTTP_PROXY_PASS_KEY, !prompt);
        }
        migrate(tree, "connection.proxyChain.realm", HTTP_PROXY_REALM_KEY);
        migrate(tree, "connection.proxyChain.userName", HTTP_PROXY_USERNAME_KEY);
        migrate(tree, "connection.proxyChain.password", HTTP_PROXY_PASSWORD_KEY);

        let mut migrated = 0;
        for old in tree.configurations_at("connection.proxyChain.exclusions.exclusion") {
            let name = old.get_string_or("name", "");
            if name.is_empty() {
                continue;
            }
            let host = if old.get_bool_or("regex", false) {
                name
            } else {
                regex::escape(&name)
            };
            let base = format!("{}({}).", HTTP_PROXY_EXCLUSION_KEY, migrated);
            if let Some(enabled) = old.get_string("enabled") {
                tree.set_property(&format!("{}{}", base, HTTP_PROXY_EXCLUSION_ENABLED_KEY), enabled);
            }
            tree.set_property(&format!("{}{}", base, HTTP_PROXY_EXCLUSION_HOST_KEY), host);
            migrated += 1;
        }
        migrate(
            tree,
            "connection.proxyChain.confirmRemoveExcludedDomain",
            HTTP_PROXY_EXCLUSIONS_CONFIRM_REMOVE,
        );

        migrate(tree, "connection.socksProxy.enabled", SOCKS_PROXY_ENABLED_KEY);
        migrate(tree, "connection.socksProxy.host", SOCKS_PROXY_HOST_KEY);
        migrate(tree, "connection.socksProxy.port", SOCKS_PROXY_PORT_KEY);
        migrate(tree, "connection.socksProxy.version", SOCKS_PROXY_VERSION_KEY);
        migrate(tree, "connection.socksProxy.dns", SOCKS_PROXY_DNS_KEY);
        migrate(tree, "connection.socksProxy.username", SOCKS_PROXY_USERNAME_KEY);
        migrate(tree, "connection.socksProxy.password", SOCKS_PROXY_PASSWORD_KEY);

        tree.clear_tree("connection");
    }

    fn parse(&mut self, tree: &ConfigTree) {
        let timeout = tree.get_int_or(TIMEOUT_KEY, DEFAULT_TIMEOUT);
        self.timeout_in_secs = if timeout < 0 { DEFAULT_TIMEOUT } else { timeout };
        self.default_user_agent = tree.get_string_or(DEFAULT_USER_AGENT_KEY, DEFAULT_DEFAULT_USER_AGENT);
        self.use_global_http_state = tree.get_bool_or(USE_GLOBAL_HTTP_STATE_KEY, false);
        self.dns_ttl_successful_queries =
            tree.get_int_or(DNS_TTL_SUCCESSFUL_QUERIES_KEY, DNS_DEFAULT_TTL_SUCCESSFUL_QUERIES);

        let protocols = tree.get_list(TLS_PROTOCOL_KEY);
        self.tls_protocols = if protocols.is_empty() {
            supported_protocols()
        } else {
            validate_protocols(protocols).unwrap_or_else(|e| {
                tracing::warn!("Failed to read TLS protocols: {}", e);
                supported_protocols()
            })
        };
        self.allow_unsafe_renegotiation = tree.get_bool_or(TLS_ALLOW_UNSAFE_RENEGOTIATION, false);

        self.parse_http_proxy(tree);
        self.parse_socks_proxy(tree);
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
        self.notify_changed();
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_http_proxy(&mut self, tree: &ConfigTree) {
        let defaults = HttpProxy::default();
        self.http_proxy_enabled = tree.get_bool_or(HTTP_PROXY_ENABLED_KEY, false);
        self.http_proxy_auth_enabled = tree.get_bool_or(HTTP_PROXY_AUTH_ENABLED_KEY, false);
        self.store_http_proxy_pass = tree.get_bool_or(STORE_HTTP_PROXY_PASS_KEY, true);

        let mut host = tree.get_string_or(HTTP_PROXY_HOST_KEY, defaults.host());
        if host.is_empty() {
            host = defaults.host().to_string();
        }
        let port = parse_port(tree.get_string(HTTP_PROXY_PORT_KEY), defaults.port());
        let authentication = PasswordAuthentication::new(
            tree.get_string_or(HTTP_PROXY_USERNAME_KEY, ""),
            tree.get_string_or(HTTP_PROXY_PASSWORD_KEY, ""),
        );
        let realm = tree.get_string_or(HTTP_PROXY_REALM_KEY, defaults.realm());
        self.http_proxy = HttpProxy::new(host, port, realm, authentication).unwrap_or(defaults);

        self.http_proxy_exclusions = tree
            .configurations_at(HTTP_PROXY_EXCLUSION_KEY)
            .iter()
            .filter_map(|sub| {
                let host = sub.get_string_or(HTTP_PROXY_EXCLUSION_HOST_KEY, "");
                let enabled = sub.get_bool_or(HTTP_PROXY_EXCLUSION_ENABLED_KEY, true);
                match HttpProxyExclusion::new(&host, enabled) {
                    Ok(exclusion) if !host.is_empty() => Some(exclusion),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Ignoring invalid HTTP proxy exclusion pattern: {}", e);
                        None
                    }
                }
            })
            .collect();
        self.confirm_remove_http_proxy_exclusion =
            tree.get_bool_or(HTTP_PROXY_EXCLUSIONS_CONFIRM_REMOVE, true);
    }

    fn parse_socks_proxy(&mut self, tree: &ConfigTree) {
        let defaults = SocksProxy::default();
        let mut host = tree.get_string_or(SOCKS_PROXY_HOST_KEY, &defaults.host);
        if host.is_empty() {
            host = defaults.host.clone();
        }
        let version = tree
            .get_string(SOCKS_PROXY_VERSION_KEY)
            .map(|v| SocksVersion::from_value(&v))
            .unwrap_or(defaults.version);

        self.socks_proxy_enabled = tree.get_bool_or(SOCKS_PROXY_ENABLED_KEY, false);
        self.socks_proxy = SocksProxy {
            host,
            port: parse_port(tree.get_string(SOCKS_PROXY_PORT_KEY), defaults.port),
            version,
            use_dns: tree.get_bool_or(SOCKS_PROXY_DNS_KEY, defaults.use_dns),
            authentication: PasswordAuthentication::new(
                tree.get_string_or(SOCKS_PROXY_USERNAME_KEY, ""),
                tree.get_string_or(SOCKS_PROXY_PASSWORD_KEY, ""),
            ),
        };
    }

    fn persist(&self, update: impl FnOnce(&mut ConfigTree)) {
        let mut tree = self.config.write();
        update(&mut tree);
    }

    fn notify_changed(&self) {
        for listener in &self.change_listeners {
            listener(self);
        }
    }

    pub fn add_change_listener(&mut self, listener: ChangeListener) {
        self.change_listeners.push(listener);
    }

    pub fn remove_change_listener(&mut self, listener: &ChangeListener) {
        self.change_listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn timeout_in_secs(&self) -> i32 {
        self.timeout_in_secs
    }

    /// Set the timeout for reads and connects, negative values reset to the default
    pub fn set_timeout_in_secs(&mut self, timeout_in_secs: i32) {
        self.timeout_in_secs = if timeout_in_secs < 0 {
            DEFAULT_TIMEOUT
        } else {
            timeout_in_secs
        };
        let value = self.timeout_in_secs;
        self.persist(|tree| tree.set_property(TIMEOUT_KEY, value));
        self.notify_changed();
    }

    pub fn default_user_agent(&self) -> &str {
        &self.default_user_agent
    }

    pub fn set_default_user_agent(&mut self, user_agent: &str) {
        self.default_user_agent = user_agent.to_string();
        self.persist(|tree| tree.set_property(DEFAULT_USER_AGENT_KEY, user_agent));
        self.notify_changed();
    }

    pub fn is_use_global_http_state(&self) -> bool {
        self.use_global_http_state
    }

    pub fn set_use_global_http_state(&mut self, use_global_http_state: bool) {
        self.use_global_http_state = use_global_http_state;
        self.persist(|tree| tree.set_property(USE_GLOBAL_HTTP_STATE_KEY, use_global_http_state));
        self.notify_changed();
    }

    pub fn dns_ttl_successful_queries(&self) -> i32 {
        self.dns_ttl_successful_queries
    }

    /// Set the TTL of successful DNS queries, negative caches forever, zero disables the cache
    pub fn set_dns_ttl_successful_queries(&mut self, ttl: i32) {
        self.dns_ttl_successful_queries = ttl;
        self.persist(|tree| tree.set_property(DNS_TTL_SUCCESSFUL_QUERIES_KEY, ttl));
        self.notify_changed();
    }

    pub fn tls_protocols(&self) -> &[String] {
        &self.tls_protocols
    }

    pub fn set_tls_protocols(&mut self, protocols: Vec<String>) -> Result<(), ConfigError> {
        self.tls_protocols = validate_protocols(protocols)?;
        let protocols = self.tls_protocols.clone();
        self.persist(|tree| tree.set_list(TLS_PROTOCOL_KEY, &protocols));
        self.notify_changed();
        Ok(())
    }

    pub fn is_allow_unsafe_renegotiation(&self) -> bool {
        self.allow_unsafe_renegotiation
    }

    pub fn set_allow_unsafe_renegotiation(&mut self, allow: bool) {
        self.allow_unsafe_renegotiation = allow;
        self.persist(|tree| tree.set_property(TLS_ALLOW_UNSAFE_RENEGOTIATION, allow));
        self.notify_changed();
    }

    pub fn is_http_proxy_enabled(&self) -> bool {
        self.http_proxy_enabled
    }

    pub fn set_http_proxy_enabled(&mut self, enabled: bool) {
        self.http_proxy_enabled = enabled;
        self.persist(|tree| tree.set_property(HTTP_PROXY_ENABLED_KEY, enabled));
        self.notify_changed();
    }

    pub fn http_proxy(&self) -> &HttpProxy {
        &self.http_proxy
    }

    pub fn set_http_proxy(&mut self, http_proxy: HttpProxy) {
        if self.http_proxy == http_proxy {
            return;
        }
        self.http_proxy = http_proxy;
        let proxy = &self.http_proxy;
        let password = if self.store_http_proxy_pass {
            proxy.authentication().password.as_str()
        } else {
            ""
        };
        self.persist(|tree| {
            tree.set_property(HTTP_PROXY_HOST_KEY, proxy.host());
            tree.set_property(HTTP_PROXY_PORT_KEY, proxy.port());
            tree.set_property(HTTP_PROXY_REALM_KEY, proxy.realm());
            tree.set_property(HTTP_PROXY_USERNAME_KEY, &proxy.authentication().user_name);
            tree.set_property(HTTP_PROXY_PASSWORD_KEY, password);
        });
        self.notify_changed();
    }

    pub fn is_http_proxy_auth_enabled(&self) -> bool {
        self.http_proxy_auth_enabled
    }

    pub fn set_http_proxy_auth_enabled(&mut self, enabled: bool) {
        self.http_proxy_auth_enabled = enabled;
        self.persist(|tree| tree.set_property(HTTP_PROXY_AUTH_ENABLED_KEY, enabled));
        self.notify_changed();
    }

    pub fn is_store_http_proxy_pass(&self) -> bool {
        self.store_http_proxy_pass
    }

    /// Whether the password of the HTTP proxy is persisted
    pub fn set_store_http_proxy_pass(&mut self, store: bool) {
        self.store_http_proxy_pass = store;
        let password = if store {
            self.http_proxy.authentication().password.clone()
        } else {
            String::new()
        };
        self.persist(|tree| {
            tree.set_property(STORE_HTTP_PROXY_PASS_KEY, store);
            tree.set_property(HTTP_PROXY_PASSWORD_KEY, password);
        });
    }

    /// Whether the HTTP proxy should be used to connect to the given host
    pub fn is_use_http_proxy(&self, host: &str) -> bool {
        if !self.http_proxy_enabled || host.is_empty() {
            return false;
        }
        !self.http_proxy_exclusions.iter().any(|e| e.test(host))
    }

    pub fn http_proxy_exclusions(&self) -> &[HttpProxyExclusion] {
        &self.http_proxy_exclusions
    }

    pub fn add_http_proxy_exclusion(&mut self, exclusion: HttpProxyExclusion) {
        self.http_proxy_exclusions.push(exclusion);
        self.persist_http_proxy_exclusions();
    }

    /// Remove the exclusion with the given host pattern
    pub fn remove_http_proxy_exclusion(&mut self, host: &str) -> bool {
        let before = self.http_proxy_exclusions.len();
        self.http_proxy_exclusions.retain(|e| e.host() != host);
        if self.http_proxy_exclusions.len() == before {
            return false;
        }
        self.persist_http_proxy_exclusions();
        true
    }

    pub fn set_http_proxy_exclusion_enabled(&mut self, host: &str, enabled: bool) -> bool {
        match self.http_proxy_exclusions.iter_mut().find(|e| e.host() == host) {
            Some(exclusion) => {
                exclusion.set_enabled(enabled);
                self.persist_http_proxy_exclusions();
                true
            }
            None => false,
        }
    }

    pub fn set_http_proxy_exclusions(&mut self, exclusions: Vec<HttpProxyExclusion>) {
        self.http_proxy_exclusions = exclusions;
        self.persist_http_proxy_exclusions();
    }

    fn persist_http_proxy_exclusions(&mut self) {
        let exclusions = &self.http_proxy_exclusions;
        self.persist(|tree| {
            tree.clear_tree(HTTP_PROXY_EXCLUSION_KEY);
            for (i, exclusion) in exclusions.iter().enumerate() {
                let base = format!("{}({}).", HTTP_PROXY_EXCLUSION_KEY, i);
                tree.set_property(&format!("{}{}", base, HTTP_PROXY_EXCLUSION_HOST_KEY), exclusion.host());
                tree.set_property(
                    &format!("{}{}", base, HTTP_PROXY_EXCLUSION_ENABLED_KEY),
                    exclusion.is_enabled(),
                );
            }
        });
        self.notify_changed();
    }

    pub fn is_confirm_remove_http_proxy_exclusion(&self) -> bool {
        self.confirm_remove_http_proxy_exclusion
    }

    pub fn set_confirm_remove_http_proxy_exclusion(&mut self, confirm: bool) {
        self.confirm_remove_http_proxy_exclusion = confirm;
        self.persist(|tree| tree.set_property(HTTP_PROXY_EXCLUSIONS_CONFIRM_REMOVE, confirm));
    }

    pub fn is_socks_proxy_enabled(&self) -> bool {
        self.socks_proxy_enabled
    }

    pub fn set_socks_proxy_enabled(&mut self, enabled: bool) {
        self.socks_proxy_enabled = enabled;
        self.persist(|tree| tree.set_property(SOCKS_PROXY_ENABLED_KEY, enabled));
        self.notify_changed();
    }

    pub fn socks_proxy(&self) -> &SocksProxy {
        &self.socks_proxy
    }

    pub fn set_socks_proxy(&mut self, socks_proxy: SocksProxy) {
        self.socks_proxy = socks_proxy;
        let proxy = &self.socks_proxy;
        self.persist(|tree| {
            tree.set_property(SOCKS_PROXY_HOST_KEY, &proxy.host);
            tree.set_property(SOCKS_PROXY_PORT_KEY, proxy.port);
            tree.set_property(SOCKS_PROXY_VERSION_KEY, proxy.version.number());
            tree.set_property(SOCKS_PROXY_DNS_KEY, proxy.use_dns);
            tree.set_property(SOCKS_PROXY_USERNAME_KEY, &proxy.authentication.user_name);
            tree.set_property(SOCKS_PROXY_PASSWORD_KEY, &proxy.authentication.password);
        });
        self.notify_changed();
    }

    /// Whether the host name should be resolved locally rather than by the SOCKS proxy
    pub fn should_resolve_remote_hostname(&self, host: &str) -> bool {
        if !self.socks_proxy_enabled
            || !self.socks_proxy.use_dns
            || self.socks_proxy.version != SocksVersion::V5
        {
            return true;
        }
        loopback_regex().is_match(host)
    }

    /// Base key of the options
    pub fn base_key() -> &'static str {
        BASE_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn load(tree: ConfigTree) -> (ConnectionOptions, SharedConfig) {
        let config = shared(tree);
        let mut options = ConnectionOptions::new();
        options.load(config.clone());
        (options, config)
    }

    #[test]
    fn test_defaults() {
        let (options, config) = load(ConfigTree::new());
        assert_eq!(options.timeout_in_secs(), DEFAULT_TIMEOUT);
        assert_eq!(options.default_user_agent(), DEFAULT_DEFAULT_USER_AGENT);
        assert_eq!(options.dns_ttl_successful_queries(), 30);
        assert_eq!(options.tls_protocols(), &["TLSv1.2", "TLSv1.3"]);
        assert!(!options.is_http_proxy_enabled());
        assert_eq!(options.http_proxy(), &HttpProxy::default());
        assert!(options.is_store_http_proxy_pass());
        assert_eq!(options.socks_proxy(), &SocksProxy::default());
        assert!(options.is_confirm_remove_http_proxy_exclusion());
        assert_eq!(config.read().get_string(CONFIG_VERSION_KEY).as_deref(), Some("1"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let mut tree = ConfigTree::new();
        tree.set_property(CONFIG_VERSION_KEY, 1);
        tree.set_property(TIMEOUT_KEY, -5);
        tree.set_property(HTTP_PROXY_HOST_KEY, "");
        tree.set_property(HTTP_PROXY_PORT_KEY, 70000);
        tree.set_property(SOCKS_PROXY_PORT_KEY, "abc");
        tree.set_property(SOCKS_PROXY_VERSION_KEY, 7);
        tree.set_property(TLS_PROTOCOL_KEY, "TLSv9");
        tree.set_property(&format!("{}(0).host", HTTP_PROXY_EXCLUSION_KEY), "(");
        tree.set_property(&format!("{}(1).host", HTTP_PROXY_EXCLUSION_KEY), "example.org");

        let (options, _) = load(tree);
        assert_eq!(options.timeout_in_secs(), DEFAULT_TIMEOUT);
        assert_eq!(options.http_proxy().host(), "localhost");
        assert_eq!(options.http_proxy().port(), 8090);
        assert_eq!(options.socks_proxy().port, 1080);
        assert_eq!(options.socks_proxy().version, SocksVersion::V5);
        assert_eq!(options.tls_protocols(), &["TLSv1.2", "TLSv1.3"]);
        assert_eq!(options.http_proxy_exclusions().len(), 1);
        assert!(options.http_proxy_exclusions()[0].is_enabled());
    }

    #[test]
    fn test_migrates_legacy_config() {
        let mut tree = ConfigTree::new();
        tree.set_property("connection.timeoutInSecs", 60);
        tree.set_property("connection.defaultUserAgent", "Agent");
        tree.set_property("connection.httpStateEnabled", true);
        tree.add_property("connection.securityProtocolsEnabled.protocol", "TLSv1.2");
        tree.add_property("connection.securityProtocolsEnabled.protocol", "SSLv2Hello");
        tree.set_property("certificate.allowUnsafeSslRenegotiation", true);
        tree.set_property("connection.proxyChain.enabled", true);
        tree.set_property("connection.proxyChain.hostName", "proxy.example.org");
        tree.set_property("connection.proxyChain.port", 3128);
        tree.set_property("connection.proxyChain.prompt", true);
        tree.set_property("connection.proxyChain.userName", "user");
        tree.set_property("connection.proxyChain.exclusions.exclusion(0).name", "a.example.org");
        tree.set_property("connection.proxyChain.exclusions.exclusion(0).enabled", false);
        tree.set_property("connection.proxyChain.exclusions.exclusion(1).name", "");
        tree.set_property("connection.proxyChain.exclusions.exclusion(2).name", r".*\.local");
        tree.set_property("connection.proxyChain.exclusions.exclusion(2).regex", true);
        tree.set_property("connection.socksProxy.enabled", true);
        tree.set_property("connection.socksProxy.version", 4);

        let (options, config) = load(tree);
        assert_eq!(options.timeout_in_secs(), 60);
        assert_eq!(options.default_user_agent(), "Agent");
        assert!(options.is_use_global_http_state());
        assert_eq!(options.tls_protocols(), &["TLSv1.2"]);
        assert!(options.is_allow_unsafe_renegotiation());
        assert!(options.is_http_proxy_enabled());
        assert_eq!(options.http_proxy().host(), "proxy.example.org");
        assert_eq!(options.http_proxy().port(), 3128);
        assert_eq!(options.http_proxy().authentication().user_name, "user");
        assert!(!options.is_store_http_proxy_pass());

        let exclusions = options.http_proxy_exclusions();
        assert_eq!(exclusions.len(), 2);
        assert_eq!(exclusions[0].host(), regex::escape("a.example.org"));
        assert!(!exclusions[0].is_enabled());
        assert_eq!(exclusions[1].host(), r".*\.local");

        assert!(options.is_socks_proxy_enabled());
        assert_eq!(options.socks_proxy().version, SocksVersion::V4);

        let tree = config.read();
        assert!(!tree.has_tree("connection"));
        assert!(!tree.contains_key("certificate.allowUnsafeSslRenegotiation"));
    }

    #[test]
    fn test_is_use_http_proxy() {
        let (mut options, _) = load(ConfigTree::new());
        assert!(!options.is_use_http_proxy("example.org"));

        options.set_http_proxy_enabled(true);
        assert!(options.is_use_http_proxy("example.org"));
        assert!(!options.is_use_http_proxy(""));

        options.add_http_proxy_exclusion(HttpProxyExclusion::new(r".*\.org", true).unwrap());
        assert!(!options.is_use_http_proxy("example.org"));
        assert!(options.is_use_http_proxy("example.com"));

        assert!(options.set_http_proxy_exclusion_enabled(r".*\.org", false));
        assert!(options.is_use_http_proxy("example.org"));
        assert!(!options.set_http_proxy_exclusion_enabled("missing", true));

        assert!(options.remove_http_proxy_exclusion(r".*\.org"));
        assert!(!options.remove_http_proxy_exclusion(r".*\.org"));
    }

    #[test]
    fn test_exclusions_persisted() {
        let (mut options, config) = load(ConfigTree::new());
        options.set_http_proxy_exclusions(vec![
            HttpProxyExclusion::new("a", true).unwrap(),
            HttpProxyExclusion::new("b", false).unwrap(),
        ]);
        options.remove_http_proxy_exclusion("a");

        let tree = config.read();
        assert_eq!(tree.get_string(&format!("{}(0).host", HTTP_PROXY_EXCLUSION_KEY)).as_deref(), Some("b"));
        assert_eq!(tree.get_string(&format!("{}(0).enabled", HTTP_PROXY_EXCLUSION_KEY)).as_deref(), Some("false"));
        assert!(!tree.contains_key(&format!("{}(1).host", HTTP_PROXY_EXCLUSION_KEY)));
    }

    #[test]
    fn test_http_proxy_password_not_stored() {
        let (mut options, config) = load(ConfigTree::new());
        options.set_store_http_proxy_pass(false);
        let proxy = HttpProxy::new("proxy", 3128, "", PasswordAuthentication::new("u", "secret")).unwrap();
        options.set_http_proxy(proxy.clone());

        assert_eq!(options.http_proxy(), &proxy);
        let tree = config.read();
        assert_eq!(tree.get_string(HTTP_PROXY_PASSWORD_KEY).as_deref(), Some(""));
        assert_eq!(tree.get_string(HTTP_PROXY_USERNAME_KEY).as_deref(), Some("u"));
    }

    #[test]
    fn test_setters_persist_and_notify() {
        let (mut options, config) = load(ConfigTree::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener: ChangeListener = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        options.add_change_listener(listener.clone());

        options.set_timeout_in_secs(-1);
        assert_eq!(options.timeout_in_secs(), DEFAULT_TIMEOUT);
        options.set_dns_ttl_successful_queries(-1);
        assert!(options.set_tls_protocols(vec![]).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        options.remove_change_listener(&listener);
        options.set_default_user_agent("UA");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let tree = config.read();
        assert_eq!(tree.get_int_or(TIMEOUT_KEY, 0), DEFAULT_TIMEOUT);
        assert_eq!(tree.get_int_or(DNS_TTL_SUCCESSFUL_QUERIES_KEY, 0), -1);
        assert_eq!(tree.get_string(DEFAULT_USER_AGENT_KEY).as_deref(), Some("UA"));
    }

    #[test]
    fn test_should_resolve_remote_hostname() {
        let (mut options, _) = load(ConfigTree::new());
        assert!(options.should_resolve_remote_hostname("example.org"));

        options.set_socks_proxy_enabled(true);
        assert!(!options.should_resolve_remote_hostname("example.org"));
        assert!(options.should_resolve_remote_hostname("localhost"));
        assert!(options.should_resolve_remote_hostname("127.0.0.2"));
        assert!(options.should_resolve_remote_hostname("[::1]"));

        options.set_socks_proxy(SocksProxy {
            version: SocksVersion::V4,
            ..SocksProxy::default()
        });
        assert!(options.should_resolve_remote_hostname("example.org"));
    }
}
