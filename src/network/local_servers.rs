//! Local servers options
//!
//! The main proxy, additional servers, aliases and pass-throughs, persisted
//! under `network.localServers`.

use std::collections::HashSet;
use std::sync::Arc;

use super::local_server::{supported_protocols, validate_protocols, DEFAULT_ADDRESS, DEFAULT_PORT};
use super::{parse_port, Alias, LocalServerConfig, PassThrough, ServerMode, TlsConfig};
use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};

const CURRENT_CONFIG_VERSION: i32 = 1;
const CONFIG_VERSION_KEY: &str = "network.localServers[@version]";

const MAIN_PROXY_BASE_KEY: &str = "network.localServers.mainProxy";
const ALL_SERVERS_KEY: &str = "network.localServers.servers.server";
const CONFIRM_REMOVE_SERVER: &str = "network.localServers.servers.confirmRemove";

const SERVER_PROXY: &str = "proxy";
const SERVER_API: &str = "api";
const SERVER_ADDRESS: &str = "address";
const SERVER_PORT: &str = "port";
const SERVER_TLS_PROTOCOL: &str = "tlsProtocols.protocol";
const SERVER_BEHIND_NAT: &str = "behindNat";
const SERVER_REMOVE_ACCEPT_ENCODING: &str = "removeAcceptEncoding";
const SERVER_DECODE_RESPONSE: &str = "decodeResponse";
const SERVER_ENABLED: &str = "enabled";

const ALL_ALIASES_KEY: &str = "network.localServers.aliases.alias";
const CONFIRM_REMOVE_ALIAS: &str = "network.localServers.aliases.confirmRemove";

const ALL_PASS_THROUGHS_KEY: &str = "network.localServers.passThroughs.passThrough";
const CONFIRM_REMOVE_PASS_THROUGH: &str = "network.localServers.passThroughs.confirmRemove";

/// Notified when the local servers change
pub trait ServersChangedListener: Send + Sync {
    fn main_proxy_set(&self, main_proxy: &LocalServerConfig);

    fn server_added(&self, server: &LocalServerConfig);

    fn server_removed(&self, server: &LocalServerConfig);

    fn servers_set(&self, servers: &[LocalServerConfig]);
}

/// Options of the local servers
pub struct LocalServersOptions {
    config: SharedConfig,
    listeners: Vec<Arc<dyn ServersChangedListener>>,

    main_proxy: LocalServerConfig,
    servers: Vec<LocalServerConfig>,
    confirm_remove_server: bool,
    aliases: Vec<Alias>,
    confirm_remove_alias: bool,
    pass_throughs: Vec<PassThrough>,
    confirm_remove_pass_through: bool,
}

impl Default for LocalServersOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            listeners: Vec::new(),
            main_proxy: LocalServerConfig::default(),
            servers: Vec::new(),
            confirm_remove_server: true,
            aliases: Vec::new(),
            confirm_remove_alias: true,
            pass_throughs: Vec::new(),
            confirm_remove_pass_through: true,
        }
    }
}

/// Server stored in `tree`, `None` when it has no address
fn read_server_config(tree: &ConfigTree) -> Option<LocalServerConfig> {
    let address = tree.get_string(SERVER_ADDRESS).filter(|a| !a.trim().is_empty())?;
    let protocols = tree.get_list(SERVER_TLS_PROTOCOL);
    let protocols = if protocols.is_empty() {
        supported_protocols()
    } else {
        validate_protocols(protocols).unwrap_or_else(|e| {
            tracing::warn!("An error occurred while setting TLS protocols: {}", e);
            supported_protocols()
        })
    };

    Some(LocalServerConfig {
        address: address.trim().to_string(),
        port: parse_port(tree.get_string(SERVER_PORT), DEFAULT_PORT),
        mode: ServerMode::from_flags(
            tree.get_bool_or(SERVER_PROXY, true),
            tree.get_bool_or(SERVER_API, true),
        ),
        tls_config: TlsConfig::new(protocols, false).unwrap_or_default(),
        behind_nat: tree.get_bool_or(SERVER_BEHIND_NAT, false),
        remove_accept_encoding: tree.get_bool_or(SERVER_REMOVE_ACCEPT_ENCODING, true),
        decode_response: tree.get_bool_or(SERVER_DECODE_RESPONSE, true),
        enabled: tree.get_bool_or(SERVER_ENABLED, true),
    })
}

fn persist_server_config(tree: &mut ConfigTree, base_key: &str, server: &LocalServerConfig) {
    let key = |name: &str| format!("{}.{}", base_key, name);
    tree.set_property(&key(SERVER_ENABLED), server.enabled);
    tree.set_property(&key(SERVER_PROXY), server.mode.has_proxy());
    tree.set_property(&key(SERVER_API), server.mode.has_api());
    tree.set_property(&key(SERVER_ADDRESS), &server.address);
    tree.set_property(&key(SERVER_PORT), server.port);
    tree.set_list(&key(SERVER_TLS_PROTOCOL), server.tls_config.protocols());
    tree.set_property(&key(SERVER_BEHIND_NAT), server.behind_nat);
    tree.set_property(&key(SERVER_REMOVE_ACCEPT_ENCODING), server.remove_accept_encoding);
    tree.set_property(&key(SERVER_DECODE_RESPONSE), server.decode_response);
}

fn persist_servers(tree: &mut ConfigTree, servers: &[LocalServerConfig]) {
    tree.clear_tree(ALL_SERVERS_KEY);
    for (i, server) in servers.iter().enumerate() {
        persist_server_config(tree, &format!("{}({})", ALL_SERVERS_KEY, i), server);
    }
}

/// The main proxy always serves as proxy
fn normalize_main_proxy(main_proxy: &mut LocalServerConfig) {
    main_proxy.enabled = true;
    if !main_proxy.mode.has_proxy() {
        main_proxy.mode = ServerMode::ApiAndProxy;
    }
}

impl VersionedOptions for LocalServersOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, tree: &mut ConfigTree, _from_version: i32) {
        let mut protocols = supported_protocols();
        if tree.contains_key("proxy.port") {
            let legacy_protocols = tree.get_list("proxy.securityProtocolsEnabled.protocol");
            if !legacy_protocols.is_empty() {
                protocols = validate_protocols(legacy_protocols).unwrap_or_else(|e| {
                    tracing::warn!("An error occurred while migrating the main proxy: {}", e);
                    supported_protocols()
                });
            }
            let mut main_proxy = LocalServerConfig {
                address: tree.get_string_or("proxy.ip", DEFAULT_ADDRESS),
                port: parse_port(tree.get_string("proxy.port"), DEFAULT_PORT),
                behind_nat: tree.get_bool_or("proxy.behindnat", false),
                remove_accept_encoding: tree.get_bool_or("proxy.removeUnsupportedEncodings", true),
                decode_response: tree.get_bool_or("proxy.decodeGzip", true),
                tls_config: TlsConfig::new(protocols.clone(), false).unwrap_or_default(),
                ..Default::default()
            };
            if main_proxy.address.is_empty() {
                main_proxy.address = DEFAULT_ADDRESS.to_string();
            }
            normalize_main_proxy(&mut main_proxy);
            persist_server_config(tree, MAIN_PROXY_BASE_KEY, &main_proxy);
        }
        tree.clear_tree("proxy");

        if let Some(confirm) = tree.get_string("proxies.confirmRemoveProxy") {
            tree.set_property(CONFIRM_REMOVE_SERVER, confirm);
        }
        let servers: Vec<LocalServerConfig> = tree
            .configurations_at("proxies.all")
            .iter()
            .filter_map(|sub| {
                let address = sub.get_string("address")?;
                Some(LocalServerConfig {
                    address,
                    port: parse_port(sub.get_string("port"), DEFAULT_PORT),
                    mode: ServerMode::ApiAndProxy,
                    tls_config: TlsConfig::new(protocols.clone(), false).unwrap_or_default(),
                    behind_nat: sub.get_bool_or("behindnat", false),
                    remove_accept_encoding: sub.get_bool_or("remunsupported", true),
                    decode_response: sub.get_bool_or("decode", true),
                    enabled: sub.get_bool_or("enabled", true),
                })
            })
            .collect();
        if !servers.is_empty() {
            persist_servers(tree, &servers);
        }
        tree.clear_tree("proxies");
    }

    fn parse(&mut self, tree: &ConfigTree) {
        self.aliases = tree
            .configurations_at(ALL_ALIASES_KEY)
            .iter()
            .filter_map(|sub| {
                let name = sub.get_string_or("name", "");
                (!name.is_empty()).then(|| Alias::with_enabled(name, sub.get_bool_or("enabled", true)))
            })
            .collect();
        self.confirm_remove_alias = tree.get_bool_or(CONFIRM_REMOVE_ALIAS, true);

        self.pass_throughs = tree
            .configurations_at(ALL_PASS_THROUGHS_KEY)
            .iter()
            .filter_map(|sub| {
                let authority = sub.get_string_or("authority", "");
                if authority.is_empty() {
                    return None;
                }
                match PassThrough::new(&authority, sub.get_bool_or("enabled", true)) {
                    Ok(pass_through) => Some(pass_through),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid pass-through pattern: {}", e);
                        None
                    }
                }
            })
            .collect();
        self.confirm_remove_pass_through = tree.get_bool_or(CONFIRM_REMOVE_PASS_THROUGH, true);

        self.read_main_proxy_and_servers(tree);
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }
}

impl LocalServersOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_main_proxy_and_servers(&mut self, tree: &ConfigTree) {
        let mut main_proxy = if tree.contains_key(&format!("{}.{}", MAIN_PROXY_BASE_KEY, SERVER_ADDRESS)) {
            tree.configurations_at(MAIN_PROXY_BASE_KEY)
                .first()
                .and_then(read_server_config)
                .unwrap_or_default()
        } else {
            LocalServerConfig::default()
        };
        normalize_main_proxy(&mut main_proxy);
        self.main_proxy = main_proxy;

        let mut addresses = HashSet::new();
        addresses.insert(self.main_proxy.authority().to_lowercase());
        self.servers = tree
            .configurations_at(ALL_SERVERS_KEY)
            .iter()
            .filter_map(read_server_config)
            .filter(|server| {
                let address = server.authority();
                if addresses.insert(address.to_lowercase()) {
                    true
                } else {
                    tracing::warn!("Discarding server with duplicated address/port: {}", address);
                    false
                }
            })
            .collect();
        self.confirm_remove_server = tree.get_bool_or(CONFIRM_REMOVE_SERVER, true);
    }

    fn persist(&self, update: impl FnOnce(&mut ConfigTree)) {
        let mut tree = self.config.write();
        update(&mut tree);
    }

    pub fn add_servers_changed_listener(&mut self, listener: Arc<dyn ServersChangedListener>) {
        self.listeners.push(listener);
    }

    pub fn main_proxy(&self) -> &LocalServerConfig {
        &self.main_proxy
    }

    /// Set the main proxy, always enabled and serving as proxy
    pub fn set_main_proxy(&mut self, mut main_proxy: LocalServerConfig) {
        normalize_main_proxy(&mut main_proxy);
        self.main_proxy = main_proxy;
        let main_proxy = &self.main_proxy;
        self.persist(|tree| persist_server_config(tree, MAIN_PROXY_BASE_KEY, main_proxy));
        self.listeners.iter().for_each(|l| l.main_proxy_set(main_proxy));
    }

    pub fn servers(&self) -> &[LocalServerConfig] {
        &self.servers
    }

    /// Add a server, expected to have a unique address and port
    pub fn add_server(&mut self, server: LocalServerConfig) {
        self.servers.push(server);
        let servers = &self.servers;
        self.persist(|tree| persist_servers(tree, servers));
        if let Some(server) = self.servers.last() {
            self.listeners.iter().for_each(|l| l.server_added(server));
        }
    }

    /// Remove the server with the given address and port
    pub fn remove_server(&mut self, address: &str, port: u16) -> bool {
        let Some(pos) = self
            .servers
            .iter()
            .position(|s| s.port == port && s.address == address)
        else {
            return false;
        };
        let server = self.servers.remove(pos);
        let servers = &self.servers;
        self.persist(|tree| persist_servers(tree, servers));
        self.listeners.iter().for_each(|l| l.server_removed(&server));
        true
    }

    pub fn set_servers(&mut self, servers: Vec<LocalServerConfig>) {
        self.servers = servers;
        let servers = &self.servers;
        self.persist(|tree| persist_servers(tree, servers));
        self.listeners.iter().for_each(|l| l.servers_set(servers));
    }

    pub fn is_confirm_remove_server(&self) -> bool {
        self.confirm_remove_server
    }

    pub fn set_confirm_remove_server(&mut self, confirm: bool) {
        self.confirm_remove_server = confirm;
        self.persist(|tree| tree.set_property(CONFIRM_REMOVE_SERVER, confirm));
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn add_alias(&mut self, alias: Alias) {
        self.aliases.push(alias);
        self.persist_aliases();
    }

    pub fn remove_alias(&mut self, name: &str) -> bool {
        let before = self.aliases.len();
        self.aliases.retain(|a| a.name() != name);
        if self.aliases.len() == before {
            return false;
        }
        self.persist_aliases();
        true
    }

    pub fn set_alias_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.aliases.iter_mut().find(|a| a.name() == name) {
            Some(alias) => {
                alias.set_enabled(enabled);
                self.persist_aliases();
                true
            }
            None => false,
        }
    }

    pub fn set_aliases(&mut self, aliases: Vec<Alias>) {
        self.aliases = aliases;
        self.persist_aliases();
    }

    fn persist_aliases(&self) {
        self.persist(|tree| {
            tree.clear_tree(ALL_ALIASES_KEY);
            for (i, alias) in self.aliases.iter().enumerate() {
                tree.set_property(&format!("{}({}).name", ALL_ALIASES_KEY, i), alias.name());
                tree.set_property(&format!("{}({}).enabled", ALL_ALIASES_KEY, i), alias.is_enabled());
            }
        });
    }

    pub fn is_confirm_remove_alias(&self) -> bool {
        self.confirm_remove_alias
    }

    pub fn set_confirm_remove_alias(&mut self, confirm: bool) {
        self.confirm_remove_alias = confirm;
        self.persist(|tree| tree.set_property(CONFIRM_REMOVE_ALIAS, confirm));
    }

    pub fn pass_throughs(&self) -> &[PassThrough] {
        &self.pass_throughs
    }

    pub fn add_pass_through(&mut self, pass_through: PassThrough) {
        self.pass_throughs.push(pass_through);
        self.persist_pass_throughs();
    }

    /// Remove the pass-through with the given authority pattern
    pub fn remove_pass_through(&mut self, authority: &str) -> bool {
        let before = self.pass_throughs.len();
        self.pass_throughs.retain(|p| p.authority() != authority);
        if self.pass_throughs.len() == before {
            return false;
        }
        self.persist_pass_throughs();
        true
    }

    pub fn set_pass_through_enabled(&mut self, authority: &str, enabled: bool) -> bool {
        match self.pass_throughs.iter_mut().find(|p| p.authority() == authority) {
            Some(pass_through) => {
                pass_through.set_enabled(enabled);
                self.persist_pass_throughs();
                true
            }
            None => false,
        }
    }

    pub fn set_pass_throughs(&mut self, pass_throughs: Vec<PassThrough>) {
        self.pass_throughs = pass_throughs;
        self.persist_pass_throughs();
    }

    fn persist_pass_throughs(&self) {
        self.persist(|tree| {
            tree.clear_tree(ALL_PASS_THROUGHS_KEY);
            for (i, pass_through) in self.pass_throughs.iter().enumerate() {
                tree.set_property(
                    &format!("{}({}).authority", ALL_PASS_THROUGHS_KEY, i),
                    pass_through.authority(),
                );
                tree.set_property(
                    &format!("{}({}).enabled", ALL_PASS_THROUGHS_KEY, i),
                    pass_through.is_enabled(),
                );
            }
        });
    }

    pub fn is_confirm_remove_pass_through(&self) -> bool {
        self.confirm_remove_pass_through
    }

    pub fn set_confirm_remove_pass_through(&mut self, confirm: bool) {
        self.confirm_remove_pass_through = confirm;
        self.persist(|tree| tree.set_property(CONFIRM_REMOVE_PASS_THROUGH, confirm));
    }

    /// Whether the host is an enabled alias
    pub fn is_alias(&self, host: &str) -> bool {
        self.aliases.iter().any(|a| a.is_enabled() && a.test(host))
    }

    /// Whether connections to `host:port` are passed through
    pub fn is_pass_through(&self, host: &str, port: u16) -> bool {
        self.pass_throughs
            .iter()
            .any(|p| p.is_enabled() && p.test(host, port))
    }
}
