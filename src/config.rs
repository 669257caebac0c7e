use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{env, fs, path::Path, path::PathBuf};

use crate::error::{GuardError, GuardResult};
use crate::types::{RealmName, ServerUrl};

/// Option key for the Keycloak base URL.
pub const SERVER_URL_OPTION: &str = "serverUrl";
/// Option key for the realm name.
pub const REALM_OPTION: &str = "realm";

/// Mandatory options, in the order they are checked.
const MANDATORIES: [&str; 2] = [SERVER_URL_OPTION, REALM_OPTION];

pub const SERVER_URL_ENV: &str = "KEYCLOAK_SERVER_URL";
pub const REALM_ENV: &str = "KEYCLOAK_REALM";
pub const CONFIG_PATH_ENV: &str = "KEYCLOAK_GUARD_CONFIG";

/// Keycloak realm the guard verifies tokens against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    server_url: ServerUrl,
    realm: RealmName,
}

impl GuardConfig {
    pub fn new(server_url: impl Into<ServerUrl>, realm: impl Into<RealmName>) -> Self {
        Self {
            server_url: server_url.into(),
            realm: realm.into(),
        }
    }

    /// Build a config from a `{ "serverUrl": ..., "realm": ... }` option map.
    ///
    /// Every key is checked before the mandatory options, so an unknown key
    /// is reported even when `realm` is also missing.
    pub fn from_options(options: &Map<String, Value>) -> GuardResult<Self> {
        if let Some(key) = options.keys().find(|k| !MANDATORIES.contains(&k.as_str())) {
            return Err(GuardError::BadConfigurationKey(key.clone()));
        }

        let server_url = mandatory_option(options, SERVER_URL_OPTION)?;
        let realm = mandatory_option(options, REALM_OPTION)?;

        Ok(Self::new(server_url, realm))
    }

    /// Build a config from `KEYCLOAK_SERVER_URL` and `KEYCLOAK_REALM`.
    pub fn from_env() -> GuardResult<Self> {
        let server_url =
            env::var(SERVER_URL_ENV).map_err(|_| GuardError::MandatoryOptionMissing(SERVER_URL_OPTION))?;
        let realm = env::var(REALM_ENV).map_err(|_| GuardError::MandatoryOptionMissing(REALM_OPTION))?;

        Ok(Self::new(server_url, realm))
    }

    /// Load a JSON option file, expanding `${VAR}` references in string values.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let Value::Object(mut options) = value else {
            anyhow::bail!("{} must contain a JSON object", path.display());
        };

        for val in options.values_mut() {
            if let Value::String(s) = val {
                *s = expand_env_vars(s);
            }
        }

        Ok(Self::from_options(&options)?)
    }

    /// Load the config file found by [`resolve_config_path`].
    pub fn load() -> anyhow::Result<Self> {
        let path = resolve_config_path()?;
        Self::from_json_file(path)
    }

    pub fn server_url(&self) -> &ServerUrl {
        &self.server_url
    }

    pub fn realm(&self) -> &RealmName {
        &self.realm
    }

    /// `{serverUrl}/realms/{realm}`
    pub fn realm_url(&self) -> String {
        let base = self.server_url.as_str();
        let base = base.strip_suffix('/').unwrap_or(base);
        format!("{}/realms/{}", base, self.realm)
    }

    /// JWKS endpoint of the realm.
    pub fn certs_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.realm_url())
    }

    /// OpenID Connect userinfo endpoint of the realm.
    pub fn userinfo_url(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.realm_url())
    }
}

fn mandatory_option(options: &Map<String, Value>, name: &'static str) -> GuardResult<String> {
    match options.get(name) {
        None | Some(Value::Null) => Err(GuardError::MandatoryOptionMissing(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(GuardError::InvalidOptionValue(name.to_string())),
    }
}

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "keycloak-guard.json";

/// Locate the config file: `KEYCLOAK_GUARD_CONFIG`, then
/// `$XDG_CONFIG_HOME/keycloak-guard/config.json`, then `./keycloak-guard.json`.
pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    let cwd = env::current_dir().context("failed to read the working directory")?;
    config_path_from(
        env::var(CONFIG_PATH_ENV).ok(),
        env::var("XDG_CONFIG_HOME").ok(),
        &cwd,
    )
}

fn config_path_from(
    explicit: Option<String>,
    xdg_config_home: Option<String>,
    cwd: &Path,
) -> anyhow::Result<PathBuf> {
    // An explicit path wins even if it does not exist; reading it reports that.
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    let candidates = xdg_config_home
        .map(|xdg| PathBuf::from(xdg).join("keycloak-guard").join("config.json"))
        .into_iter()
        .chain(std::iter::once(cwd.join(CONFIG_FILE_NAME)));

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    anyhow::bail!(
        "Could not find {} (set {} or create ./{})",
        CONFIG_FILE_NAME,
        CONFIG_PATH_ENV,
        CONFIG_FILE_NAME
    )
}

/// Replace `${VAR}` references with environment values.
///
/// Unset variables and an unterminated `${` are kept literally.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        match env::var(&after[..end]) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that touch process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("options must be an object"),
        }
    }

    #[test]
    fn test_from_options_valid() {
        let config = GuardConfig::from_options(&options(json!({
            "serverUrl": "https://sso.example.com",
            "realm": "acme"
        })))
        .unwrap();

        assert_eq!(config.server_url().as_str(), "https://sso.example.com");
        assert_eq!(config.realm().as_str(), "acme");
    }

    #[test]
    fn test_from_options_rejects_unknown_key() {
        let err = GuardConfig::from_options(&options(json!({
            "serverUrl": "x",
            "realm": "y",
            "foo": "z"
        })))
        .unwrap_err();

        assert!(matches!(err, GuardError::BadConfigurationKey(ref k) if k == "foo"));
    }

    #[test]
    fn test_unknown_key_reported_before_missing_option() {
        let err = GuardConfig::from_options(&options(json!({ "clientId": "app" }))).unwrap_err();
        assert!(matches!(err, GuardError::BadConfigurationKey(ref k) if k == "clientId"));
    }

    #[test]
    fn test_from_options_missing_realm() {
        let err = GuardConfig::from_options(&options(json!({ "serverUrl": "x" }))).unwrap_err();
        assert!(matches!(err, GuardError::MandatoryOptionMissing("realm")));
    }

    #[test]
    fn test_from_options_null_server_url() {
        let err =
            GuardConfig::from_options(&options(json!({ "serverUrl": null, "realm": "y" }))).unwrap_err();
        assert!(matches!(err, GuardError::MandatoryOptionMissing("serverUrl")));
    }

    #[test]
    fn test_from_options_non_string_value() {
        let err =
            GuardConfig::from_options(&options(json!({ "serverUrl": "x", "realm": 42 }))).unwrap_err();
        assert!(matches!(err, GuardError::InvalidOptionValue(ref k) if k == "realm"));
    }

    #[test]
    fn test_endpoint_urls() {
        let config = GuardConfig::new("https://sso.example.com", "acme");
        assert_eq!(config.realm_url(), "https://sso.example.com/realms/acme");
        assert_eq!(
            config.certs_url(),
            "https://sso.example.com/realms/acme/protocol/openid-connect/certs"
        );
        assert_eq!(
            config.userinfo_url(),
            "https://sso.example.com/realms/acme/protocol/openid-connect/userinfo"
        );
    }

    #[test]
    fn test_endpoint_urls_ignore_trailing_slash() {
        let config = GuardConfig::new("https://sso.example.com/", "acme");
        assert_eq!(config.realm_url(), "https://sso.example.com/realms/acme");
    }

    #[test]
    fn test_serialize_uses_option_keys() {
        let config = GuardConfig::new("https://sso.example.com", "acme");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({ "serverUrl": "https://sso.example.com", "realm": "acme" })
        );
    }

    #[test]
    fn test_expand_env_vars() {
        let _env = env_lock();
        // SAFETY: test-local variable name, not read elsewhere.
        unsafe { env::set_var("KEYCLOAK_GUARD_TEST_HOST", "sso.internal") };

        assert_eq!(
            expand_env_vars("https://${KEYCLOAK_GUARD_TEST_HOST}/auth"),
            "https://sso.internal/auth"
        );
        assert_eq!(
            expand_env_vars("${KEYCLOAK_GUARD_TEST_UNSET_VAR}"),
            "${KEYCLOAK_GUARD_TEST_UNSET_VAR}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(
            expand_env_vars("${KEYCLOAK_GUARD_TEST_HOST}:${unterminated"),
            "sso.internal:${unterminated"
        );
    }

    #[test]
    fn test_from_json_file() {
        let _env = env_lock();
        // SAFETY: test-local variable name, not read elsewhere.
        unsafe { env::set_var("KEYCLOAK_GUARD_TEST_REALM", "acme") };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "serverUrl": "https://sso.example.com", "realm": "${{KEYCLOAK_GUARD_TEST_REALM}}" }}"#
        )
        .unwrap();

        let config = GuardConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config, GuardConfig::new("https://sso.example.com", "acme"));
    }

    #[test]
    fn test_from_json_file_unknown_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "serverUrl": "x", "realm": "y", "secret": "z" }}"#).unwrap();

        let err = GuardConfig::from_json_file(file.path()).unwrap_err();
        let guard_err = err.downcast_ref::<GuardError>().unwrap();
        assert!(matches!(guard_err, GuardError::BadConfigurationKey(k) if k == "secret"));
    }

    #[test]
    fn test_from_json_file_not_an_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["serverUrl", "realm"]"#).unwrap();

        let err = GuardConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("must contain a JSON object"));
    }

    #[test]
    fn test_from_env() {
        let _env = env_lock();
        // SAFETY: env access is serialized by ENV_LOCK.
        unsafe {
            env::set_var(SERVER_URL_ENV, "https://sso.example.com");
            env::set_var(REALM_ENV, "acme");
        }
        assert_eq!(
            GuardConfig::from_env().unwrap(),
            GuardConfig::new("https://sso.example.com", "acme")
        );

        unsafe { env::remove_var(REALM_ENV) };
        assert!(matches!(
            GuardConfig::from_env().unwrap_err(),
            GuardError::MandatoryOptionMissing("realm")
        ));

        unsafe { env::remove_var(SERVER_URL_ENV) };
        assert!(matches!(
            GuardConfig::from_env().unwrap_err(),
            GuardError::MandatoryOptionMissing("serverUrl")
        ));
    }

    #[test]
    fn test_config_path_explicit_wins() {
        let dir = tempfile::tempdir().unwrap();
        let xdg = dir.path().join("xdg");
        fs::create_dir_all(xdg.join("keycloak-guard")).unwrap();
        fs::write(xdg.join("keycloak-guard").join("config.json"), "{}").unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{}").unwrap();

        let path = config_path_from(
            Some("/etc/keycloak/guard.json".to_string()),
            Some(xdg.display().to_string()),
            dir.path(),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/etc/keycloak/guard.json"));
    }

    #[test]
    fn test_config_path_xdg_before_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let xdg = dir.path().join("xdg");
        let xdg_file = xdg.join("keycloak-guard").join("config.json");
        fs::create_dir_all(xdg_file.parent().unwrap()).unwrap();
        fs::write(&xdg_file, "{}").unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{}").unwrap();

        let path = config_path_from(None, Some(xdg.display().to_string()), dir.path()).unwrap();
        assert_eq!(path, xdg_file);
    }

    #[test]
    fn test_config_path_falls_back_to_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&local, "{}").unwrap();

        // XDG directory without a config file is skipped.
        let empty_xdg = dir.path().join("empty-xdg");
        let path = config_path_from(None, Some(empty_xdg.display().to_string()), dir.path()).unwrap();
        assert_eq!(path, local);

        let path = config_path_from(None, None, dir.path()).unwrap();
        assert_eq!(path, local);
    }

    #[test]
    fn test_config_path_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let err = config_path_from(None, None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Could not find keycloak-guard.json"));
    }

    #[test]
    fn test_load_from_config_env() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("guard.json");
        fs::write(&file, r#"{ "serverUrl": "https://sso.example.com", "realm": "acme" }"#).unwrap();

        // SAFETY: env access is serialized by ENV_LOCK.
        unsafe { env::set_var(CONFIG_PATH_ENV, &file) };
        let loaded = GuardConfig::load();

        unsafe { env::set_var(CONFIG_PATH_ENV, dir.path().join("missing.json")) };
        let missing = GuardConfig::load();
        unsafe { env::remove_var(CONFIG_PATH_ENV) };

        assert_eq!(loaded.unwrap(), GuardConfig::new("https://sso.example.com", "acme"));
        assert!(missing.unwrap_err().to_string().contains("failed to read"));
    }
}
