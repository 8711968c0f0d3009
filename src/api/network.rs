//! Actions, views and others of the `network` component

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::{
    param_bool, param_int, param_int_or, param_opt_str, param_port, param_str, ApiError,
    ApiErrorKind, ApiRequest, ApiResponse, RequestType,
};
use crate::network::{
    Alias, ExtensionNetwork, GroupBy, HttpProxy, HttpProxyExclusion, LocalServerConfig,
    PassThrough, PasswordAuthentication, RateLimitRule, ServerMode, SocksProxy, SocksVersion,
    API_DOMAIN,
};

pub const PREFIX: &str = "network";

const PARAM_ADDRESS: &str = "address";
const PARAM_API: &str = "api";
const PARAM_AUTHORITY: &str = "authority";
const PARAM_BEHIND_NAT: &str = "behindNat";
const PARAM_DECODE_RESPONSE: &str = "decodeResponse";
const PARAM_DESCRIPTION: &str = "description";
const PARAM_ENABLED: &str = "enabled";
const PARAM_FILE_PATH: &str = "filePath";
const PARAM_GROUP_BY: &str = "groupBy";
const PARAM_HOST: &str = "host";
const PARAM_INDEX: &str = "index";
const PARAM_MATCH_REGEX: &str = "matchRegex";
const PARAM_MATCH_STRING: &str = "matchString";
const PARAM_NAME: &str = "name";
const PARAM_PASSWORD: &str = "password";
const PARAM_PORT: &str = "port";
const PARAM_PROXY: &str = "proxy";
const PARAM_REALM: &str = "realm";
const PARAM_REMOVE_ACCEPT_ENCODING: &str = "removeAcceptEncoding";
const PARAM_REQUESTS_PER_SECOND: &str = "requestsPerSecond";
const PARAM_TIMEOUT: &str = "timeout";
const PARAM_TTL: &str = "ttl";
const PARAM_USE: &str = "use";
const PARAM_USE_DNS: &str = "useDns";
const PARAM_USER_AGENT: &str = "userAgent";
const PARAM_USERNAME: &str = "username";
const PARAM_VALIDITY: &str = "validity";
const PARAM_VERSION: &str = "version";

const ROOT_CA_CERT_FILE_NAME: &str = "ZAPCACert.cer";

type Params = HashMap<String, String>;

fn illegal(name: &str) -> ApiError {
    ApiError::with_detail(ApiErrorKind::IllegalParameter, name)
}

fn does_not_exist(name: &str) -> ApiError {
    ApiError::with_detail(ApiErrorKind::DoesNotExist, name)
}

fn ok_if(changed: bool, name: &str) -> Result<ApiResponse, ApiError> {
    if changed {
        Ok(ApiResponse::OK)
    } else {
        Err(does_not_exist(name))
    }
}

/// The `network` API component
#[derive(Clone)]
pub struct NetworkApi {
    extension: Arc<RwLock<ExtensionNetwork>>,
}

impl NetworkApi {
    pub fn new(extension: Arc<RwLock<ExtensionNetwork>>) -> Self {
        Self { extension }
    }

    pub fn extension(&self) -> &Arc<RwLock<ExtensionNetwork>> {
        &self.extension
    }

    /// Handle a request addressed to this component
    pub fn handle(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.component != PREFIX {
            return Err(ApiError::with_detail(
                ApiErrorKind::NoImplementor,
                request.component.clone(),
            ));
        }
        tracing::debug!(name = %request.name, kind = ?request.request_type, "API request");
        match request.request_type {
            RequestType::Action => self.handle_action(&request.name, &request.params),
            RequestType::View => self.handle_view(&request.name),
            RequestType::Other => self.handle_other(&request.name, &request.params, request.host.as_deref()),
        }
    }

    pub fn handle_action(&self, name: &str, params: &Params) -> Result<ApiResponse, ApiError> {
        let mut extension = self.extension.write();
        match name {
            "addAlias" => {
                let alias = Alias::with_enabled(param_str(params, PARAM_NAME)?, param_bool(params, PARAM_ENABLED, true)?);
                extension.local_servers_options_mut().add_alias(alias);
                Ok(ApiResponse::OK)
            }
            "addHttpProxyExclusion" => {
                let enabled = param_bool(params, PARAM_ENABLED, true)?;
                let exclusion = HttpProxyExclusion::new(param_str(params, PARAM_HOST)?, enabled)
                    .map_err(|_| illegal(PARAM_HOST))?;
                extension.connection_options_mut().add_http_proxy_exclusion(exclusion);
                Ok(ApiResponse::OK)
            }
            "addLocalServer" => {
                let mut server = LocalServerConfig::new(
                    param_str(params, PARAM_ADDRESS)?,
                    param_port(params, PARAM_PORT)?,
                );
                server.mode = ServerMode::from_flags(
                    param_bool(params, PARAM_PROXY, true)?,
                    param_bool(params, PARAM_API, true)?,
                );
                server.behind_nat = param_bool(params, PARAM_BEHIND_NAT, false)?;
                server.remove_accept_encoding = param_bool(params, PARAM_REMOVE_ACCEPT_ENCODING, true)?;
                server.decode_response = param_bool(params, PARAM_DECODE_RESPONSE, true)?;
                extension.validate_local_server(&server).map_err(|e| {
                    ApiError::with_detail(ApiErrorKind::IllegalParameter, e.to_string())
                })?;
                extension.local_servers_options_mut().add_server(server);
                Ok(ApiResponse::OK)
            }
            "addPassThrough" => {
                let enabled = param_bool(params, PARAM_ENABLED, true)?;
                let pass_through = PassThrough::new(param_str(params, PARAM_AUTHORITY)?, enabled)
                    .map_err(|_| illegal(PARAM_AUTHORITY))?;
                extension.local_servers_options_mut().add_pass_through(pass_through);
                Ok(ApiResponse::OK)
            }
            "addPkcs12ClientCertificate" => {
                let file = param_str(params, PARAM_FILE_PATH)?;
                let password = param_opt_str(params, PARAM_PASSWORD);
                let index = param_int_or(params, PARAM_INDEX, 0)?;
                let options = extension.client_certificates_options_mut();
                options
                    .add_pkcs12_certificate(Path::new(file), password, index)
                    .map_err(|e| {
                        tracing::warn!("Failed to add the certificate: {}", e);
                        ApiError::with_detail(ApiErrorKind::BadExternalData, "Failed to add the certificate.")
                    })?;
                options.set_use_certificate(true);
                Ok(ApiResponse::OK)
            }
            "generateRootCaCert" => {
                if extension.generate_root_ca_cert() {
                    Ok(ApiResponse::OK)
                } else {
                    Ok(ApiResponse::FAIL)
                }
            }
            "importRootCaCert" => {
                let file = param_str(params, PARAM_FILE_PATH)?;
                match extension.import_root_ca_cert(Path::new(file)) {
                    None => Ok(ApiResponse::OK),
                    Some(message) => Err(ApiError::with_detail(ApiErrorKind::IllegalParameter, message)),
                }
            }
            "removeAlias" => {
                let removed = extension.local_servers_options_mut().remove_alias(param_str(params, PARAM_NAME)?);
                ok_if(removed, PARAM_NAME)
            }
            "addRateLimitRule" => {
                let description = param_str(params, PARAM_DESCRIPTION)?;
                if extension.rate_limit_options().rule(description).is_some() {
                    return Err(ApiError::with_detail(ApiErrorKind::AlreadyExists, PARAM_DESCRIPTION));
                }
                let requests_per_second = u32::try_from(param_int_or(params, PARAM_REQUESTS_PER_SECOND, 1)?)
                    .ok()
                    .filter(|r| *r > 0)
                    .ok_or_else(|| illegal(PARAM_REQUESTS_PER_SECOND))?;
                let group_by = match param_opt_str(params, PARAM_GROUP_BY) {
                    "" => GroupBy::Rule,
                    value => value.parse().map_err(|_| illegal(PARAM_GROUP_BY))?,
                };
                let rule = RateLimitRule::new(
                    description,
                    param_str(params, PARAM_MATCH_STRING)?,
                    param_bool(params, PARAM_MATCH_REGEX, false)?,
                    requests_per_second,
                    group_by,
                    param_bool(params, PARAM_ENABLED, true)?,
                )
                .map_err(|_| illegal(PARAM_MATCH_STRING))?;
                extension.rate_limit_options_mut().add_rule(rule);
                Ok(ApiResponse::OK)
            }
            "removeHttpProxyExclusion" => {
                let removed = extension
                    .connection_options_mut()
                    .remove_http_proxy_exclusion(param_str(params, PARAM_HOST)?);
                ok_if(removed, PARAM_HOST)
            }
            "removeLocalServer" => {
                let address = param_str(params, PARAM_ADDRESS)?;
                let port = param_port(params, PARAM_PORT)?;
                if extension.local_servers_options_mut().remove_server(address, port) {
                    Ok(ApiResponse::OK)
                } else {
                    Err(ApiError::new(ApiErrorKind::DoesNotExist))
                }
            }
            "removeRateLimitRule" => {
                let removed = extension
                    .rate_limit_options_mut()
                    .remove_rule(param_str(params, PARAM_DESCRIPTION)?);
                ok_if(removed, PARAM_DESCRIPTION)
            }
            "removePassThrough" => {
                let removed = extension
                    .local_servers_options_mut()
                    .remove_pass_through(param_str(params, PARAM_AUTHORITY)?);
                ok_if(removed, PARAM_AUTHORITY)
            }
            "setAliasEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, true)?;
                let changed = extension
                    .local_servers_options_mut()
                    .set_alias_enabled(param_str(params, PARAM_NAME)?, enabled);
                ok_if(changed, PARAM_NAME)
            }
            "setConnectionTimeout" => {
                let timeout = param_int(params, PARAM_TIMEOUT)?;
                extension.connection_options_mut().set_timeout_in_secs(timeout);
                Ok(ApiResponse::OK)
            }
            "setDefaultUserAgent" => {
                let user_agent = param_str(params, PARAM_USER_AGENT)?;
                extension.connection_options_mut().set_default_user_agent(user_agent);
                Ok(ApiResponse::OK)
            }
            "setDnsTtlSuccessfulQueries" => {
                let ttl = param_int(params, PARAM_TTL)?;
                extension.connection_options_mut().set_dns_ttl_successful_queries(ttl);
                Ok(ApiResponse::OK)
            }
            "setHttpProxy" => {
                let host = param_str(params, PARAM_HOST)?;
                let port = param_port(params, PARAM_PORT)?;
                let authentication = PasswordAuthentication::new(
                    param_opt_str(params, PARAM_USERNAME),
                    param_opt_str(params, PARAM_PASSWORD),
                );
                let proxy = HttpProxy::new(host, port, param_opt_str(params, PARAM_REALM), authentication)
                    .map_err(|_| illegal(PARAM_HOST))?;
                extension.connection_options_mut().set_http_proxy(proxy);
                Ok(ApiResponse::OK)
            }
            "setHttpProxyAuthEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, false)?;
                extension.connection_options_mut().set_http_proxy_auth_enabled(enabled);
                Ok(ApiResponse::OK)
            }
            "setHttpProxyEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, false)?;
                extension.connection_options_mut().set_http_proxy_enabled(enabled);
                Ok(ApiResponse::OK)
            }
            "setHttpProxyExclusionEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, true)?;
                let changed = extension
                    .connection_options_mut()
                    .set_http_proxy_exclusion_enabled(param_str(params, PARAM_HOST)?, enabled);
                ok_if(changed, PARAM_HOST)
            }
            "setPassThroughEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, true)?;
                let changed = extension
                    .local_servers_options_mut()
                    .set_pass_through_enabled(param_str(params, PARAM_AUTHORITY)?, enabled);
                ok_if(changed, PARAM_AUTHORITY)
            }
            "setRateLimitRuleEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, false)?;
                let changed = extension
                    .rate_limit_options_mut()
                    .set_enabled(param_str(params, PARAM_DESCRIPTION)?, enabled);
                ok_if(changed, PARAM_DESCRIPTION)
            }
            "setRootCaCertValidity" => {
                let days = param_int(params, PARAM_VALIDITY).map_err(|_| illegal(PARAM_VALIDITY))?;
                extension
                    .server_certificates_options_mut()
                    .set_root_ca_cert_validity(Duration::days(days.into()))
                    .map_err(|_| illegal(PARAM_VALIDITY))?;
                Ok(ApiResponse::OK)
            }
            "setServerCertValidity" => {
                let days = param_int(params, PARAM_VALIDITY).map_err(|_| illegal(PARAM_VALIDITY))?;
                extension
                    .server_certificates_options_mut()
                    .set_server_cert_validity(Duration::days(days.into()))
                    .map_err(|_| illegal(PARAM_VALIDITY))?;
                Ok(ApiResponse::OK)
            }
            "setSocksProxy" => {
                let defaults = SocksProxy::default();
                let proxy = SocksProxy {
                    host: param_str(params, PARAM_HOST)?.to_string(),
                    port: param_port(params, PARAM_PORT)?,
                    version: match param_opt_str(params, PARAM_VERSION) {
                        "" => defaults.version,
                        value => SocksVersion::from_value(value),
                    },
                    use_dns: param_bool(params, PARAM_USE_DNS, defaults.use_dns)?,
                    authentication: PasswordAuthentication::new(
                        param_opt_str(params, PARAM_USERNAME),
                        param_opt_str(params, PARAM_PASSWORD),
                    ),
                };
                extension.connection_options_mut().set_socks_proxy(proxy);
                Ok(ApiResponse::OK)
            }
            "setSocksProxyEnabled" => {
                let enabled = param_bool(params, PARAM_ENABLED, false)?;
                extension.connection_options_mut().set_socks_proxy_enabled(enabled);
                Ok(ApiResponse::OK)
            }
            "setUseClientCertificate" => {
                let use_certificate = param_bool(params, PARAM_USE, false)?;
                extension.client_certificates_options_mut().set_use_certificate(use_certificate);
                Ok(ApiResponse::OK)
            }
            "setUseGlobalHttpState" => {
                let use_global = param_bool(params, PARAM_USE, false)?;
                extension.connection_options_mut().set_use_global_http_state(use_global);
                Ok(ApiResponse::OK)
            }
            _ => Err(ApiError::with_detail(ApiErrorKind::BadAction, name)),
        }
    }

    pub fn handle_view(&self, name: &str) -> Result<ApiResponse, ApiError> {
        let extension = self.extension.read();
        let connection = extension.connection_options();
        let local_servers = extension.local_servers_options();
        let value: Value = match name {
            "getAliases" => local_servers
                .aliases()
                .iter()
                .map(|a| json!({ "name": a.name(), "enabled": a.is_enabled() }))
                .collect(),
            "getConnectionTimeout" => connection.timeout_in_secs().to_string().into(),
            "getDefaultUserAgent" => connection.default_user_agent().into(),
            "getDnsTtlSuccessfulQueries" => connection.dns_ttl_successful_queries().to_string().into(),
            "getHttpProxy" => {
                let proxy = connection.http_proxy();
                json!({
                    "host": proxy.host(),
                    "port": proxy.port(),
                    "realm": proxy.realm(),
                    "username": proxy.authentication().user_name,
                    "password": proxy.authentication().password,
                })
            }
            "getHttpProxyExclusions" => connection
                .http_proxy_exclusions()
                .iter()
                .map(|e| json!({ "host": e.host(), "enabled": e.is_enabled() }))
                .collect(),
            "getLocalServers" => local_servers
                .servers()
                .iter()
                .map(|s| {
                    json!({
                        "address": s.address,
                        "port": s.port,
                        "api": s.mode.has_api(),
                        "proxy": s.mode.has_proxy(),
                        "behindNat": s.behind_nat,
                        "removeAcceptEncoding": s.remove_accept_encoding,
                        "decodeResponse": s.decode_response,
                        "enabled": s.enabled,
                    })
                })
                .collect(),
            "getPassThroughs" => local_servers
                .pass_throughs()
                .iter()
                .map(|p| json!({ "authority": p.authority(), "enabled": p.is_enabled() }))
                .collect(),
            "getRateLimitRules" => extension
                .rate_limit_options()
                .rules()
                .iter()
                .map(|r| {
                    json!({
                        "description": r.description(),
                        "enabled": r.is_enabled(),
                        "matchRegex": r.is_match_regex(),
                        "matchString": r.match_string(),
                        "requestsPerSecond": r.requests_per_second(),
                        "groupBy": r.group_by().name(),
                    })
                })
                .collect(),
            "getRootCaCertValidity" => extension
                .server_certificates_options()
                .root_ca_cert_validity()
                .num_days()
                .to_string()
                .into(),
            "getServerCertValidity" => extension
                .server_certificates_options()
                .server_cert_validity()
                .num_days()
                .to_string()
                .into(),
            "getSocksProxy" => {
                let proxy = connection.socks_proxy();
                json!({
                    "host": proxy.host,
                    "port": proxy.port,
                    "version": proxy.version.number().to_string(),
                    "useDns": proxy.use_dns,
                    "username": proxy.authentication.user_name,
                    "password": proxy.authentication.password,
                })
            }
            "isHttpProxyAuthEnabled" => connection.is_http_proxy_auth_enabled().to_string().into(),
            "isHttpProxyEnabled" => connection.is_http_proxy_enabled().to_string().into(),
            "isSocksProxyEnabled" => connection.is_socks_proxy_enabled().to_string().into(),
            "isUseGlobalHttpState" => connection.is_use_global_http_state().to_string().into(),
            _ => return Err(ApiError::with_detail(ApiErrorKind::BadView, name)),
        };
        Ok(ApiResponse::element(name, value))
    }

    pub fn handle_other(&self, name: &str, params: &Params, host: Option<&str>) -> Result<ApiResponse, ApiError> {
        match name {
            "proxy.pac" => {
                let content = self
                    .extension
                    .read()
                    .proxy_pac_content(host.unwrap_or(API_DOMAIN));
                Ok(ApiResponse::other("application/x-ns-proxy-autoconfig", content))
            }
            "rootCaCert" => {
                let extension = self.extension.read();
                if extension.server_certificates_options().root_ca_key_store().is_none() {
                    return Err(ApiError::new(ApiErrorKind::DoesNotExist));
                }
                let pem = extension.root_ca_cert_pem().unwrap_or_default();
                if pem.is_empty() {
                    return Err(ApiError::new(ApiErrorKind::InternalError));
                }
                Ok(ApiResponse::Other {
                    content_type: "application/pkix-cert".to_string(),
                    body: pem.into_bytes(),
                    filename: Some(ROOT_CA_CERT_FILE_NAME.to_string()),
                })
            }
            "setProxy" => {
                let json: Value = serde_json::from_str(param_str(params, PARAM_PROXY)?)
                    .map_err(|_| illegal(PARAM_PROXY))?;
                self.set_proxy(&json);
                Ok(ApiResponse::other("text/html", "OK"))
            }
            _ => Err(ApiError::with_detail(ApiErrorKind::BadOther, name)),
        }
    }

    /// Apply a browser proxy setting, `{"type":1,"http":{"host":..,"port":..}}`
    fn set_proxy(&self, json: &Value) {
        if json.get("type").and_then(Value::as_i64) != Some(1) {
            return;
        }
        let http = &json["http"];
        let host = http.get("host").and_then(Value::as_str).unwrap_or_default();
        let port = http
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0);

        let mut extension = self.extension.write();
        let connection = extension.connection_options_mut();
        let current = connection.http_proxy();
        match HttpProxy::new(host, port, current.realm(), current.authentication().clone()) {
            Ok(proxy) => {
                connection.set_http_proxy(proxy);
                connection.set_http_proxy_enabled(true);
            }
            Err(e) => tracing::debug!("Ignoring proxy setting: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> NetworkApi {
        NetworkApi::new(Arc::new(RwLock::new(ExtensionNetwork::default())))
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn action(api: &NetworkApi, name: &str, pairs: &[(&str, &str)]) -> Result<ApiResponse, ApiError> {
        api.handle_action(name, &params(pairs))
    }

    fn kind(result: Result<ApiResponse, ApiError>) -> ApiErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_unknown_names() {
        let api = api();
        assert_eq!(kind(action(&api, "nope", &[])), ApiErrorKind::BadAction);
        assert_eq!(kind(api.handle_view("nope")), ApiErrorKind::BadView);
        assert_eq!(kind(api.handle_other("nope", &Params::new(), None)), ApiErrorKind::BadOther);

        let request = ApiRequest::parse("/JSON/core/view/version/").unwrap();
        assert_eq!(kind(api.handle(&request)), ApiErrorKind::NoImplementor);
    }

    #[test]
    fn test_aliases() {
        let api = api();
        assert_eq!(kind(action(&api, "addAlias", &[])), ApiErrorKind::MissingParameter);
        assert_eq!(action(&api, "addAlias", &[("name", "example.org")]), Ok(ApiResponse::OK));
        assert_eq!(
            api.handle_view("getAliases").unwrap().to_json(),
            Some(json!({"getAliases": [{"name": "example.org", "enabled": true}]}))
        );
        assert_eq!(
            action(&api, "setAliasEnabled", &[("name", "example.org"), ("enabled", "false")]),
            Ok(ApiResponse::OK)
        );
        assert_eq!(
            kind(action(&api, "setAliasEnabled", &[("name", "other")])),
            ApiErrorKind::DoesNotExist
        );
        assert_eq!(action(&api, "removeAlias", &[("name", "example.org")]), Ok(ApiResponse::OK));
        assert_eq!(kind(action(&api, "removeAlias", &[("name", "example.org")])), ApiErrorKind::DoesNotExist);
    }

    #[test]
    fn test_http_proxy_exclusions() {
        let api = api();
        assert_eq!(
            kind(action(&api, "addHttpProxyExclusion", &[("host", "(")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            action(&api, "addHttpProxyExclusion", &[("host", r"example\.org"), ("enabled", "false")]),
            Ok(ApiResponse::OK)
        );
        assert_eq!(
            api.handle_view("getHttpProxyExclusions").unwrap().to_json(),
            Some(json!({"getHttpProxyExclusions": [{"host": r"example\.org", "enabled": false}]}))
        );
        assert_eq!(
            action(&api, "removeHttpProxyExclusion", &[("host", r"example\.org")]),
            Ok(ApiResponse::OK)
        );
    }

    #[test]
    fn test_pass_throughs() {
        let api = api();
        assert_eq!(action(&api, "addPassThrough", &[("authority", r"example\.org:443")]), Ok(ApiResponse::OK));
        assert!(api.extension().read().local_servers_options().is_pass_through("example.org", 443));
        assert_eq!(
            kind(action(&api, "setPassThroughEnabled", &[("authority", "other")])),
            ApiErrorKind::DoesNotExist
        );
        assert_eq!(
            action(&api, "removePassThrough", &[("authority", r"example\.org:443")]),
            Ok(ApiResponse::OK)
        );
    }

    #[test]
    fn test_local_servers() {
        let api = api();
        assert_eq!(
            kind(action(&api, "addLocalServer", &[("address", "127.0.0.1"), ("port", "70000")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            kind(action(&api, "addLocalServer", &[("address", "localhost"), ("port", "8080")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            kind(action(&api, "addLocalServer", &[("address", "LOCALHOST"), ("port", "8080")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            kind(action(&api, "addLocalServer", &[("address", "127.0.0.1")])),
            ApiErrorKind::MissingParameter
        );
        assert_eq!(
            kind(action(&api, "removeLocalServer", &[("address", "127.0.0.1")])),
            ApiErrorKind::MissingParameter
        );

        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap();
        let port = port.to_string();
        assert_eq!(
            action(&api, "addLocalServer", &[("address", "127.0.0.1"), ("port", &port), ("api", "false")]),
            Ok(ApiResponse::OK)
        );
        let servers = api.handle_view("getLocalServers").unwrap().to_json().unwrap();
        assert_eq!(servers["getLocalServers"][0]["api"], json!(false));
        assert_eq!(servers["getLocalServers"][0]["proxy"], json!(true));

        assert_eq!(
            action(&api, "removeLocalServer", &[("address", "127.0.0.1"), ("port", &port)]),
            Ok(ApiResponse::OK)
        );
        assert_eq!(
            kind(action(&api, "removeLocalServer", &[("address", "127.0.0.1"), ("port", &port)])),
            ApiErrorKind::DoesNotExist
        );
    }

    #[test]
    fn test_connection_settings() {
        let api = api();
        action(&api, "setConnectionTimeout", &[("timeout", "60")]).unwrap();
        action(&api, "setDefaultUserAgent", &[("userAgent", "Agent")]).unwrap();
        action(&api, "setDnsTtlSuccessfulQueries", &[("ttl", "-1")]).unwrap();
        action(&api, "setUseGlobalHttpState", &[("use", "true")]).unwrap();
        assert_eq!(kind(action(&api, "setConnectionTimeout", &[("timeout", "x")])), ApiErrorKind::IllegalParameter);

        let view = |name: &str| api.handle_view(name).unwrap().to_json().unwrap()[name].clone();
        assert_eq!(view("getConnectionTimeout"), json!("60"));
        assert_eq!(view("getDefaultUserAgent"), json!("Agent"));
        assert_eq!(view("getDnsTtlSuccessfulQueries"), json!("-1"));
        assert_eq!(view("isUseGlobalHttpState"), json!("true"));
        assert!(api.extension().read().is_global_http_state());
    }

    #[test]
    fn test_rate_limit_rules() {
        let api = api();
        let rule = [("description", "limit example.org"), ("matchString", "example.org"), ("enabled", "false")];
        assert_eq!(action(&api, "addRateLimitRule", &rule), Ok(ApiResponse::OK));
        assert_eq!(kind(action(&api, "addRateLimitRule", &rule)), ApiErrorKind::AlreadyExists);
        assert_eq!(
            api.handle_view("getRateLimitRules").unwrap().to_json(),
            Some(json!({"getRateLimitRules": [{
                "description": "limit example.org",
                "enabled": false,
                "matchRegex": false,
                "matchString": "example.org",
                "requestsPerSecond": 1,
                "groupBy": "RULE"
            }]}))
        );

        assert_eq!(
            action(
                &api,
                "addRateLimitRule",
                &[("description", "hosts"), ("matchString", r".*\.test"), ("matchRegex", "true"), ("groupBy", "host"), ("requestsPerSecond", "10")],
            ),
            Ok(ApiResponse::OK)
        );
        {
            let extension = api.extension().read();
            let rule = extension.rate_limit_options().rule("hosts").unwrap();
            assert_eq!(rule.group_by(), GroupBy::Host);
            assert_eq!(rule.requests_per_second(), 10);
            assert!(rule.applies_to("www.test"));
        }

        let invalid = |pairs: &[(&str, &str)]| kind(action(&api, "addRateLimitRule", pairs));
        assert_eq!(
            invalid(&[("description", "a"), ("matchString", "("), ("matchRegex", "true")]),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            invalid(&[("description", "a"), ("matchString", "x"), ("requestsPerSecond", "0")]),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            invalid(&[("description", "a"), ("matchString", "x"), ("groupBy", "site")]),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(invalid(&[("description", "a")]), ApiErrorKind::MissingParameter);

        assert_eq!(
            action(&api, "setRateLimitRuleEnabled", &[("description", "limit example.org"), ("enabled", "true")]),
            Ok(ApiResponse::OK)
        );
        assert!(api.extension().read().rate_limit_options().rules()[0].is_enabled());
        assert_eq!(
            kind(action(&api, "setRateLimitRuleEnabled", &[("description", "other"), ("enabled", "true")])),
            ApiErrorKind::DoesNotExist
        );
        assert_eq!(action(&api, "removeRateLimitRule", &[("description", "hosts")]), Ok(ApiResponse::OK));
        assert_eq!(
            kind(action(&api, "removeRateLimitRule", &[("description", "hosts")])),
            ApiErrorKind::DoesNotExist
        );
    }

    #[test]
    fn test_http_proxy() {
        let api = api();
        assert_eq!(
            kind(action(&api, "setHttpProxy", &[("host", "proxy.example.org"), ("port", "0")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            kind(action(&api, "setHttpProxy", &[("host", "proxy.example.org")])),
            ApiErrorKind::MissingParameter
        );
        action(
            &api,
            "setHttpProxy",
            &[("host", "proxy.example.org"), ("port", "3128"), ("username", "user"), ("password", "pass")],
        )
        .unwrap();
        action(&api, "setHttpProxyEnabled", &[("enabled", "true")]).unwrap();
        action(&api, "setHttpProxyAuthEnabled", &[("enabled", "true")]).unwrap();

        let proxy = api.handle_view("getHttpProxy").unwrap().to_json().unwrap();
        assert_eq!(
            proxy["getHttpProxy"],
            json!({"host": "proxy.example.org", "port": 3128, "realm": "", "username": "user", "password": "pass"})
        );
        assert_eq!(
            api.handle_view("isHttpProxyEnabled").unwrap().to_json(),
            Some(json!({"isHttpProxyEnabled": "true"}))
        );
        assert_eq!(
            api.handle_view("isHttpProxyAuthEnabled").unwrap().to_json(),
            Some(json!({"isHttpProxyAuthEnabled": "true"}))
        );
    }

    #[test]
    fn test_socks_proxy() {
        let api = api();
        action(&api, "setSocksProxy", &[("host", "socks.example.org"), ("port", "1081"), ("version", "4")]).unwrap();
        action(&api, "setSocksProxyEnabled", &[("enabled", "true")]).unwrap();
        let proxy = api.handle_view("getSocksProxy").unwrap().to_json().unwrap();
        assert_eq!(proxy["getSocksProxy"]["version"], json!("4"));
        assert_eq!(proxy["getSocksProxy"]["port"], json!(1081));
        assert_eq!(proxy["getSocksProxy"]["useDns"], json!(true));
        assert_eq!(
            api.handle_view("isSocksProxyEnabled").unwrap().to_json(),
            Some(json!({"isSocksProxyEnabled": "true"}))
        );
    }

    #[test]
    fn test_cert_validity() {
        let api = api();
        assert_eq!(
            kind(action(&api, "setRootCaCertValidity", &[("validity", "0")])),
            ApiErrorKind::IllegalParameter
        );
        assert_eq!(
            kind(action(&api, "setServerCertValidity", &[("validity", "x")])),
            ApiErrorKind::IllegalParameter
        );
        action(&api, "setRootCaCertValidity", &[("validity", "30")]).unwrap();
        action(&api, "setServerCertValidity", &[("validity", "7")]).unwrap();
        assert_eq!(
            api.handle_view("getRootCaCertValidity").unwrap().to_json(),
            Some(json!({"getRootCaCertValidity": "30"}))
        );
        assert_eq!(
            api.handle_view("getServerCertValidity").unwrap().to_json(),
            Some(json!({"getServerCertValidity": "7"}))
        );
    }

    #[test]
    fn test_root_ca_cert() {
        let api = api();
        assert_eq!(
            kind(api.handle_other("rootCaCert", &Params::new(), None)),
            ApiErrorKind::DoesNotExist
        );
        assert_eq!(action(&api, "generateRootCaCert", &[]), Ok(ApiResponse::OK));

        match api.handle_other("rootCaCert", &Params::new(), None).unwrap() {
            ApiResponse::Other { content_type, body, filename } => {
                assert_eq!(content_type, "application/pkix-cert");
                assert_eq!(filename.as_deref(), Some("ZAPCACert.cer"));
                assert!(String::from_utf8(body).unwrap().starts_with("-----BEGIN CERTIFICATE-----"));
            }
            other => panic!("Unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_import_root_ca_cert_error() {
        let api = api();
        let error = action(&api, "importRootCaCert", &[("filePath", "/not/a/file.pem")]).unwrap_err();
        assert_eq!(error.kind, ApiErrorKind::IllegalParameter);
        assert!(error.detail.unwrap().starts_with("Failed to read the selected .pem file:"));
    }

    #[test]
    fn test_add_pkcs12_certificate_error() {
        let api = api();
        assert_eq!(
            kind(action(&api, "addPkcs12ClientCertificate", &[("filePath", "/not/a/file.p12"), ("password", "x")])),
            ApiErrorKind::BadExternalData
        );
        assert!(!api.extension().read().client_certificates_options().is_use_certificate());
    }

    #[test]
    fn test_proxy_pac() {
        let api = api();
        match api.handle_other("proxy.pac", &Params::new(), Some("example.org")).unwrap() {
            ApiResponse::Other { content_type, body, .. } => {
                assert_eq!(content_type, "application/x-ns-proxy-autoconfig");
                assert!(String::from_utf8(body).unwrap().contains("PROXY localhost:8080"));
            }
            other => panic!("Unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_set_proxy() {
        let api = api();
        assert_eq!(
            kind(api.handle_other("setProxy", &params(&[("proxy", "{not json")]), None)),
            ApiErrorKind::IllegalParameter
        );
        let proxy = r#"{"type":1,"http":{"host":"proxy.example.org","port":8888}}"#;
        api.handle_other("setProxy", &params(&[("proxy", proxy)]), None).unwrap();

        let extension = api.extension().read();
        assert!(extension.connection_options().is_http_proxy_enabled());
        assert_eq!(extension.connection_options().http_proxy().host(), "proxy.example.org");
        assert_eq!(extension.connection_options().http_proxy().port(), 8888);
    }
}
