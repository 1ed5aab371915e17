use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL; a cell's URL is `{base_url}/{cell}/`.
    pub base_url: String,
    /// Reverse proxies whose `X-Forwarded-For` header is believed. Requests from any other
    /// peer are attributed to the peer address itself.
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub authn: AuthnConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub password: PasswordPolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdminConfig {
    /// CIDR networks allowed to reach `/__admin`. Examples: "127.0.0.1/32", "10.0.0.0/8".
    /// If not provided, defaults to common private & loopback ranges.
    #[serde(default = "default_admin_allowed_nets")]
    pub allowed_nets: Vec<IpNet>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            allowed_nets: default_admin_allowed_nets(),
        }
    }
}

/// Account lockout and authentication interval policy.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthnConfig {
    /// Failures before the account gets locked. 0 disables account locking.
    pub account_lock_count: u32,
    /// Seconds an account stays locked.
    pub account_lock_time: u64,
    /// Seconds after a failure during which any attempt fails. 0 disables it.
    pub valid_authn_interval: u64,
}

impl Default for AuthnConfig {
    fn default() -> Self {
        Self {
            account_lock_count: 5,
            account_lock_time: 600,
            valid_authn_interval: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime in seconds used when the client does not ask for one.
    pub access_token_lifetime: i64,
    /// Upper bound for a requested `expires_in`.
    pub max_access_token_lifetime: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: 3600,
            max_access_token_lifetime: 3600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub acquire_timeout_ms: u64,
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub rsa_bits: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self { rsa_bits: 2048 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 32,
        }
    }
}

impl AppConfig {
    /// Root URL of a cell, always with a trailing slash.
    pub fn cell_url(&self, cell: &str) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), cell)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Validation(format!("base_url is not a URL: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(
                "base_url must be an http(s) URL".into(),
            ));
        }
        if self.token.access_token_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "token.access_token_lifetime must be > 0".into(),
            ));
        }
        if self.token.max_access_token_lifetime < self.token.access_token_lifetime {
            return Err(ConfigError::Validation(
                "token.max_access_token_lifetime must be >= token.access_token_lifetime".into(),
            ));
        }
        // ring refuses to sign with anything shorter.
        if self.keys.rsa_bits < 2048 {
            return Err(ConfigError::Validation(
                "keys.rsa_bits must be at least 2048".into(),
            ));
        }
        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            return Err(ConfigError::Validation(
                "password.min_length must be in 1..=password.max_length".into(),
            ));
        }
        if self.lock.acquire_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "lock.acquire_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let a_bytes = a.octets();
                let b_bytes = b.octets();
                let full_bytes = (self.prefix / 8) as usize;
                let rem_bits = self.prefix % 8;
                if a_bytes[..full_bytes] != b_bytes[..full_bytes] {
                    return false;
                }
                if rem_bits == 0 {
                    return true;
                }
                let mask = (!0u8) << (8 - rem_bits);
                (a_bytes[full_bytes] & mask) == (b_bytes[full_bytes] & mask)
            }
            _ => false,
        }
    }

    /// Parses a comma separated CIDR list such as an account's `ip_address_range`.
    /// A bare address is treated as a host route.
    pub fn parse_list(list: &str) -> Result<Vec<IpNet>, String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains('/') {
                    s.parse()
                } else {
                    let addr = IpAddr::from_str(s).map_err(|e| format!("Invalid IP: {e}"))?;
                    let prefix = if addr.is_ipv4() { 32 } else { 128 };
                    Ok(IpNet { addr, prefix })
                }
            })
            .collect()
    }
}

impl FromStr for IpNet {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| "CIDR must contain '/'".to_string())?;
        let addr = IpAddr::from_str(ip_part).map_err(|e| format!("Invalid IP: {e}"))?;
        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| format!("Invalid prefix: {e}"))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix as u32 > max {
            return Err("Prefix out of range".into());
        }
        Ok(IpNet { addr, prefix })
    }
}

impl TryFrom<String> for IpNet {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_allowed_nets() -> Vec<IpNet> {
    [
        "127.0.0.1/32",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "::1/128",
        "fc00::/7",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double underscores
/// (e.g. `AUTHN__ACCOUNT_LOCK_COUNT`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries that want to abort on a bad configuration.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn ipv4_basic_matching() {
        let net: IpNet = "192.168.1.0/24".parse().unwrap();
        assert!(net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))));
        assert!(!net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 2, 1))));
    }

    #[test]
    fn ipv4_prefix_zero() {
        let net: IpNet = "0.0.0.0/0".parse().unwrap();
        assert!(net.contains(&IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn ipv6_full_prefix() {
        let net: IpNet = "::1/128".parse().unwrap();
        assert!(net.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!net.contains(&IpAddr::V6("::2".parse::<Ipv6Addr>().unwrap())));
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!("192.168.0.0/33".parse::<IpNet>().is_err());
        assert!("2001:db8::/129".parse::<IpNet>().is_err());
    }

    #[test]
    fn parse_list_accepts_hosts_and_ranges() {
        let nets = IpNet::parse_list("10.0.0.0/8, 192.168.1.7").unwrap();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[1].prefix, 32);
        assert!(nets[1].contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7))));
        assert!(!nets[1].contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 8))));
        assert!(IpNet::parse_list("10.0.0.0/8,bogus").is_err());
    }

    #[test]
    fn cell_url_has_single_slashes() {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            base_url: "https://example.com/".into(),
            trusted_proxies: Vec::new(),
            admin: AdminConfig::default(),
            authn: AuthnConfig::default(),
            token: TokenConfig::default(),
            lock: LockConfig::default(),
            keys: KeysConfig::default(),
            password: PasswordPolicy::default(),
        };
        assert_eq!(cfg.cell_url("alpha"), "https://example.com/alpha/");
        assert!(cfg.validate().is_ok());
    }
}
