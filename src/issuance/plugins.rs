use std::{collections::BTreeMap, fmt};

use log::warn;
use serde::{Deserialize, Serialize};

/// DNS-01 provider handed to the ACME client via `--dns`.
///
/// Known providers carry the environment keys their plugin reads; anything
/// else is passed through by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DnsPlugin {
    Namecheap,
    Route53,
    Cloudflare,
    DigitalOcean,
    Other(String),
}

impl DnsPlugin {
    /// Provider code as understood by lego.
    pub fn code(&self) -> &str {
        match self {
            DnsPlugin::Namecheap => "namecheap",
            DnsPlugin::Route53 => "route53",
            DnsPlugin::Cloudflare => "cloudflare",
            DnsPlugin::DigitalOcean => "digitalocean",
            DnsPlugin::Other(code) => code.as_str(),
        }
    }

    /// Environment keys the provider needs before it can answer a challenge.
    pub fn required_env(&self) -> &'static [&'static str] {
        match self {
            DnsPlugin::Namecheap => &["NAMECHEAP_API_USER", "NAMECHEAP_API_KEY"],
            DnsPlugin::Route53 => &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_REGION"],
            DnsPlugin::Cloudflare => &["CF_DNS_API_TOKEN"],
            DnsPlugin::DigitalOcean => &["DO_AUTH_TOKEN"],
            DnsPlugin::Other(_) => &[],
        }
    }

    /// Lists required keys absent from `secrets`.
    ///
    /// The ACME client is the authority on credentials, so this only feeds a
    /// warning and never blocks an invocation.
    pub fn missing_env(&self, secrets: &BTreeMap<String, String>) -> Vec<&'static str> {
        let missing: Vec<&'static str> = self
            .required_env()
            .iter()
            .copied()
            .filter(|key| secrets.get(*key).is_none_or(|value| value.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            warn!(
                "[plugins] {} plugin is missing environment keys: {}",
                self.code(),
                missing.join(", ")
            );
        }
        missing
    }
}

impl From<String> for DnsPlugin {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "namecheap" => DnsPlugin::Namecheap,
            "route53" => DnsPlugin::Route53,
            "cloudflare" => DnsPlugin::Cloudflare,
            "digitalocean" => DnsPlugin::DigitalOcean,
            _ => DnsPlugin::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for DnsPlugin {
    fn from(value: &str) -> Self {
        DnsPlugin::from(value.to_string())
    }
}

impl From<DnsPlugin> for String {
    fn from(value: DnsPlugin) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for DnsPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_providers_case_insensitively() {
        assert_eq!(DnsPlugin::from("Route53"), DnsPlugin::Route53);
        assert_eq!(DnsPlugin::from(" cloudflare "), DnsPlugin::Cloudflare);
        assert_eq!(DnsPlugin::from("digitalocean").code(), "digitalocean");
    }

    #[test]
    fn unknown_providers_pass_through() {
        let plugin = DnsPlugin::from("gandiv5");
        assert_eq!(plugin, DnsPlugin::Other("gandiv5".to_string()));
        assert_eq!(plugin.code(), "gandiv5");
        assert!(plugin.required_env().is_empty());
    }

    #[test]
    fn reports_missing_and_blank_keys() {
        let mut secrets = BTreeMap::new();
        secrets.insert("NAMECHEAP_API_USER".to_string(), "ops".to_string());
        secrets.insert("NAMECHEAP_API_KEY".to_string(), "  ".to_string());
        assert_eq!(
            DnsPlugin::Namecheap.missing_env(&secrets),
            vec!["NAMECHEAP_API_KEY"]
        );

        secrets.insert("NAMECHEAP_API_KEY".to_string(), "key".to_string());
        assert!(DnsPlugin::Namecheap.missing_env(&secrets).is_empty());
    }

    #[test]
    fn serializes_as_plugin_code() {
        let json = serde_json::to_string(&DnsPlugin::DigitalOcean).unwrap();
        assert_eq!(json, "\"digitalocean\"");
        let parsed: DnsPlugin = serde_json::from_str("\"namecheap\"").unwrap();
        assert_eq!(parsed, DnsPlugin::Namecheap);
    }
}
