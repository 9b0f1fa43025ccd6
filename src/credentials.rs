//! OAuth2 credentials assembled from `DRIVE_*` environment entries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, Result, ResultExt};

pub const CLIENT_ID: &str = "DRIVE_CLIENT_ID";
pub const PROJECT_ID: &str = "DRIVE_PROJECT_ID";
pub const CLIENT_SECRET: &str = "DRIVE_CLIENT_SECRET";
pub const ACCESS_TOKEN: &str = "DRIVE_ACCESS_TOKEN";
pub const REFRESH_TOKEN: &str = "DRIVE_REFRESH_TOKEN";
pub const TOKEN_EXPIRY: &str = "DRIVE_TOKEN_EXPIRY";

/// Variables that must all be set before talking to Drive, in check order.
pub const REQUIRED_VARS: [&str; 6] =
    [CLIENT_ID, PROJECT_ID, CLIENT_SECRET, ACCESS_TOKEN, REFRESH_TOKEN, TOKEN_EXPIRY];

const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CERT_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";
const REDIRECT_URIS: [&str; 2] = ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"];

#[derive(Serialize, Deserialize, Debug)]
struct OAuthData {
    installed: Installed,
}

#[derive(Serialize, Deserialize, Debug)]
struct Installed {
    client_id: String,
    project_id: String,
    auth_uri: String,
    token_uri: String,
    auth_provider_x509_cert_url: String,
    client_secret: String,
    redirect_uris: Vec<String>,
}

/// An OAuth2 bearer token as handed to the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    values: HashMap<String, String>,
}

impl CredentialSet {
    /// Parses `KEY=VALUE` entries, splitting on the first `=`. Later
    /// duplicates overwrite earlier ones.
    pub fn from_environment<I, S>(entries: I) -> Result<CredentialSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = HashMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ErrorKind::MalformedEntry(entry.to_string()))?;
            values.insert(key.to_string(), value.to_string());
        }
        Ok(CredentialSet { values })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> CredentialSet
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CredentialSet { values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Required variables that are not set, in check order.
    pub fn missing(&self) -> Vec<&'static str> {
        REQUIRED_VARS.iter().copied().filter(|var| !self.values.contains_key(*var)).collect()
    }

    fn value(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// The "installed application" client config Google's OAuth2 libraries read.
    /// Absent variables become empty strings.
    pub fn application_config(&self) -> Result<Vec<u8>> {
        let data = OAuthData {
            installed: Installed {
                client_id: self.value(CLIENT_ID),
                project_id: self.value(PROJECT_ID),
                auth_uri: AUTH_URI.to_string(),
                token_uri: TOKEN_URI.to_string(),
                auth_provider_x509_cert_url: CERT_URL.to_string(),
                client_secret: self.value(CLIENT_SECRET),
                redirect_uris: REDIRECT_URIS.iter().map(|uri| uri.to_string()).collect(),
            },
        };
        serde_json::to_vec(&data).chain_err(|| "Unable to marshal credentials json")
    }

    pub fn token(&self) -> Result<Token> {
        let raw = self.value(TOKEN_EXPIRY);
        let expiry = DateTime::parse_from_rfc3339(&raw)
            .chain_err(|| ErrorKind::InvalidExpiry(raw.clone()))?
            .with_timezone(&Utc);
        Ok(Token {
            access_token: self.value(ACCESS_TOKEN),
            token_type: "Bearer".to_string(),
            refresh_token: self.value(REFRESH_TOKEN),
            expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn complete() -> CredentialSet {
        CredentialSet::from_environment([
            "DRIVE_CLIENT_ID=1h23j5js4jd3rsd6sj57",
            "DRIVE_PROJECT_ID=projectid",
            "DRIVE_CLIENT_SECRET=s3cr3t",
            "DRIVE_ACCESS_TOKEN=d79sg78s789789",
            "DRIVE_REFRESH_TOKEN=d8b8fgr8fb8rb7",
            "DRIVE_TOKEN_EXPIRY=2019-03-23T21:56:46.085692+02:00",
        ])
        .unwrap()
    }

    #[test]
    fn parses_entries_and_later_duplicates_win() {
        let creds = CredentialSet::from_environment(["A=1", "B=2", "A=3"]).unwrap();
        assert_eq!(creds.get("A"), Some("3"));
        assert_eq!(creds.get("B"), Some("2"));
    }

    #[test]
    fn splits_on_first_equals_only() {
        let creds = CredentialSet::from_environment(["SECRET=a=b==", "EMPTY="]).unwrap();
        assert_eq!(creds.get("SECRET"), Some("a=b=="));
        assert_eq!(creds.get("EMPTY"), Some(""));
    }

    #[test]
    fn rejects_entry_without_equals() {
        let err = CredentialSet::from_environment(["A=1", "garbage"]).unwrap_err();
        match err.kind() {
            ErrorKind::MalformedEntry(entry) => assert_eq!(entry, "garbage"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_lists_absent_variables_in_order() {
        assert!(complete().missing().is_empty());
        let creds = CredentialSet::from_pairs([(PROJECT_ID, "p"), (ACCESS_TOKEN, "a")]);
        assert_eq!(creds.missing(), vec![CLIENT_ID, CLIENT_SECRET, REFRESH_TOKEN, TOKEN_EXPIRY]);
    }

    #[test]
    fn application_config_has_installed_shape() {
        let json: serde_json::Value =
            serde_json::from_slice(&complete().application_config().unwrap()).unwrap();
        let installed = &json["installed"];
        assert_eq!(installed["client_id"], "1h23j5js4jd3rsd6sj57");
        assert_eq!(installed["project_id"], "projectid");
        assert_eq!(installed["client_secret"], "s3cr3t");
        assert_eq!(installed["auth_uri"], "https://accounts.google.com/o/oauth2/auth");
        assert_eq!(installed["token_uri"], "https://oauth2.googleapis.com/token");
        assert_eq!(
            installed["auth_provider_x509_cert_url"],
            "https://www.googleapis.com/oauth2/v1/certs"
        );
        assert_eq!(
            installed["redirect_uris"],
            serde_json::json!(["urn:ietf:wg:oauth:2.0:oob", "http://localhost"])
        );
    }

    #[test]
    fn application_config_tolerates_missing_keys() {
        let json: serde_json::Value =
            serde_json::from_slice(&CredentialSet::default().application_config().unwrap())
                .unwrap();
        assert_eq!(json["installed"]["client_id"], "");
        assert_eq!(json["installed"]["client_secret"], "");
    }

    #[test]
    fn token_is_bearer_with_parsed_expiry() {
        let token = complete().token().unwrap();
        assert_eq!(token.access_token, "d79sg78s789789");
        assert_eq!(token.refresh_token, "d8b8fgr8fb8rb7");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expiry.to_rfc3339(), "2019-03-23T19:56:46.085692+00:00");
    }

    #[test]
    fn token_rejects_non_rfc3339_expiry() {
        let creds = CredentialSet::from_pairs([(TOKEN_EXPIRY, "next tuesday")]);
        let err = creds.token().unwrap_err();
        match err.kind() {
            ErrorKind::InvalidExpiry(value) => assert_eq!(value, "next tuesday"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
