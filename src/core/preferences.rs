/*
 * The preference surface handed to dock components. A `Preferences` instance
 * scopes all keys to an owner namespace below `/apps/docky`, resolves
 * relative keys to absolute registry paths, auto-creates missing keys with
 * the caller's default, and normalizes change notifications back to
 * namespace-relative keys. Failures never propagate to callers as panics:
 * reads fall back to the default, writes report success as a bool.
 *
 * Secure (credential) values ride on an injected `SecretServiceBridge`; they
 * exist only for string values and only for namespaced owners.
 */
use super::secure_store::SecretServiceBridge;
use super::settings_registry::{
    NotifyCallback, NotifyId, SettingValue, SettingsRegistryOperations,
};
use std::sync::Arc;

/// Root of Docky's registry subtree.
pub const ROOT_PATH: &str = "/apps/docky";

/*
 * Owner names become registry path components, so anything that is not
 * alphanumeric is replaced with an underscore. The mapping is idempotent:
 * sanitizing an already-sanitized name changes nothing.
 */
pub fn sanitize_owner_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

pub struct Preferences {
    registry: Arc<dyn SettingsRegistryOperations>,
    owner: Option<String>,
    prefix: String,
    secret_bridge: Option<Arc<SecretServiceBridge>>,
}

impl Preferences {
    /// Preferences for a named dock component, scoped to its own namespace.
    pub fn for_owner(registry: Arc<dyn SettingsRegistryOperations>, owner: &str) -> Self {
        let sanitized = sanitize_owner_name(owner);
        let prefix = format!("{ROOT_PATH}/{sanitized}");
        Preferences {
            registry,
            owner: Some(sanitized),
            prefix,
            secret_bridge: None,
        }
    }

    /// The global (unnamespaced) preferences at the registry root. Secure
    /// operations are not available here.
    pub fn global(registry: Arc<dyn SettingsRegistryOperations>) -> Self {
        Preferences {
            registry,
            owner: None,
            prefix: ROOT_PATH.to_string(),
            secret_bridge: None,
        }
    }

    pub fn with_secret_bridge(mut self, bridge: Arc<SecretServiceBridge>) -> Self {
        self.secret_bridge = Some(bridge);
        self
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Keys already starting with the path separator are absolute and used
    /// verbatim; anything else is joined to the owner's namespace prefix.
    pub fn absolute_path(&self, key: &str) -> String {
        if key.starts_with('/') {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let path = self.absolute_path(key);
        match self.registry.read(&path) {
            Ok(Some(SettingValue::Bool(value))) => value,
            Ok(other) => self.auto_create(&path, other, SettingValue::Bool(default), default),
            Err(e) => {
                log::warn!("Preferences: Read of '{path}' failed, using default: {e}");
                default
            }
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        let path = self.absolute_path(key);
        match self.registry.read(&path) {
            Ok(Some(SettingValue::Int(value))) => value,
            Ok(other) => self.auto_create(&path, other, SettingValue::Int(default), default),
            Err(e) => {
                log::warn!("Preferences: Read of '{path}' failed, using default: {e}");
                default
            }
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        let path = self.absolute_path(key);
        match self.registry.read(&path) {
            Ok(Some(SettingValue::Str(value))) => value,
            Ok(other) => self.auto_create(
                &path,
                other,
                SettingValue::Str(default.to_string()),
                default.to_string(),
            ),
            Err(e) => {
                log::warn!("Preferences: Read of '{path}' failed, using default: {e}");
                default.to_string()
            }
        }
    }

    /*
     * Handles the missing-or-mismatched half of a get: the caller's default
     * is written back so the key exists (with its type) from now on, and the
     * default is returned. A failed write-back still returns the default.
     */
    fn auto_create<T>(
        &self,
        path: &str,
        previous: Option<SettingValue>,
        value: SettingValue,
        default: T,
    ) -> T {
        if let Some(old) = previous {
            log::debug!(
                "Preferences: Replacing type-mismatched value {old:?} at '{path}' with default"
            );
        }
        if let Err(e) = self.registry.write(path, value) {
            log::warn!("Preferences: Failed to auto-create '{path}': {e}");
        }
        default
    }

    pub fn set_bool(&self, key: &str, value: bool) -> bool {
        self.set_value(key, SettingValue::Bool(value))
    }

    pub fn set_int(&self, key: &str, value: i64) -> bool {
        self.set_value(key, SettingValue::Int(value))
    }

    pub fn set_string(&self, key: &str, value: &str) -> bool {
        self.set_value(key, SettingValue::Str(value.to_string()))
    }

    fn set_value(&self, key: &str, value: SettingValue) -> bool {
        let path = self.absolute_path(key);
        match self.registry.write(&path, value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Preferences: Write of '{path}' failed: {e}");
                false
            }
        }
    }

    /*
     * Registers `handler` for changes at or below `key`. The handler receives
     * the changed key relative to this owner's namespace prefix (absolute
     * paths outside the namespace are passed through unchanged).
     */
    pub fn add_notify(
        &self,
        key: &str,
        handler: Arc<dyn Fn(&str, &SettingValue) + Send + Sync>,
    ) -> NotifyId {
        let watch_path = self.absolute_path(key);
        let namespace_prefix = format!("{}/", self.prefix);
        let wrapped: NotifyCallback = Arc::new(move |path, value| {
            let relative = path.strip_prefix(&namespace_prefix).unwrap_or(path);
            handler(relative, value);
        });
        self.registry.add_notify(&watch_path, wrapped)
    }

    pub fn remove_notify(&self, id: NotifyId) {
        self.registry.remove_notify(id);
    }

    /*
     * Stores a credential under this owner's namespace. Only string values
     * exist in the secure store, and only namespaced owners may use it; the
     * global instance fails fast without touching the worker thread.
     */
    pub fn set_secure_string(&self, key: &str, value: &str) -> bool {
        let Some(owner) = &self.owner else {
            log::error!(
                "Preferences: Secure storage is unsupported for the global namespace (key '{key}')"
            );
            return false;
        };
        let Some(bridge) = &self.secret_bridge else {
            log::error!("Preferences: No secret bridge configured for owner '{owner}'");
            return false;
        };
        let path = self.absolute_path(key);
        match bridge.store_secret(&path, value) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Preferences: Secure write of '{path}' failed: {e}");
                false
            }
        }
    }

    pub fn get_secure_string(&self, key: &str, default: &str) -> String {
        let Some(owner) = &self.owner else {
            log::error!(
                "Preferences: Secure storage is unsupported for the global namespace (key '{key}')"
            );
            return default.to_string();
        };
        let Some(bridge) = &self.secret_bridge else {
            log::error!("Preferences: No secret bridge configured for owner '{owner}'");
            return default.to_string();
        };
        let path = self.absolute_path(key);
        match bridge.lookup_secret(&path) {
            Ok(Some(secret)) => secret,
            Ok(None) => default.to_string(),
            Err(e) => {
                log::warn!("Preferences: Secure read of '{path}' failed: {e}");
                default.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::secure_store::CoreSecretStore;
    use crate::core::settings_registry::CoreSettingsRegistry;
    use std::sync::Mutex;

    fn registry() -> Arc<CoreSettingsRegistry> {
        Arc::new(CoreSettingsRegistry::in_memory())
    }

    #[test]
    fn test_sanitize_owner_name_is_idempotent() {
        assert_eq!(sanitize_owner_name("Bookmarks Plugin"), "Bookmarks_Plugin");
        assert_eq!(sanitize_owner_name("net-view.2"), "net_view_2");
        let once = sanitize_owner_name("weird!name?");
        assert_eq!(sanitize_owner_name(&once), once);
    }

    #[test]
    fn test_absolute_and_relative_key_resolution() {
        let prefs = Preferences::for_owner(registry(), "bookmarks");
        assert_eq!(
            prefs.absolute_path("show_hidden"),
            "/apps/docky/bookmarks/show_hidden"
        );
        assert_eq!(prefs.absolute_path("/system/http_proxy"), "/system/http_proxy");
    }

    #[test]
    fn test_get_auto_creates_with_default_and_persists_it() {
        let registry = registry();
        let prefs = Preferences::for_owner(registry.clone(), "bookmarks");

        // Fresh store: the first default wins and is written back.
        assert_eq!(prefs.get_int("icon_size", 48), 48);
        // A later get with a different default must return the created value.
        assert_eq!(prefs.get_int("icon_size", 64), 48);
        assert_eq!(
            registry.read("/apps/docky/bookmarks/icon_size").unwrap(),
            Some(SettingValue::Int(48))
        );
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let prefs = Preferences::for_owner(registry(), "bookmarks");
        assert!(prefs.set_bool("show_hidden", true));
        assert!(prefs.get_bool("show_hidden", false));

        assert!(prefs.set_string("theme", "glass"));
        assert_eq!(prefs.get_string("theme", "default"), "glass");
    }

    #[test]
    fn test_type_mismatch_is_replaced_with_default() {
        let registry = registry();
        let prefs = Preferences::for_owner(registry.clone(), "bookmarks");
        assert!(prefs.set_string("icon_size", "large"));

        // Reading the same key as an int treats the entry as missing.
        assert_eq!(prefs.get_int("icon_size", 48), 48);
        assert_eq!(
            registry.read("/apps/docky/bookmarks/icon_size").unwrap(),
            Some(SettingValue::Int(48))
        );
    }

    #[test]
    fn test_notify_key_is_relative_to_namespace() {
        let prefs = Preferences::for_owner(registry(), "bookmarks");
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let id = prefs.add_notify(
            "",
            Arc::new(move |key, _value| {
                seen_clone.lock().unwrap().push(key.to_string());
            }),
        );
        // An empty relative key subscribes to the whole namespace.
        prefs.set_bool("show_hidden", true);
        assert_eq!(*seen.lock().unwrap(), vec!["show_hidden".to_string()]);

        prefs.remove_notify(id);
        prefs.set_bool("show_hidden", false);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_secure_roundtrip_for_namespaced_owner() {
        let bridge = Arc::new(SecretServiceBridge::spawn(Box::new(CoreSecretStore::new())));
        let prefs =
            Preferences::for_owner(registry(), "netview").with_secret_bridge(bridge);

        assert!(prefs.set_secure_string("password", "hunter2"));
        assert_eq!(prefs.get_secure_string("password", ""), "hunter2");
        assert_eq!(prefs.get_secure_string("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_secure_ops_rejected_for_global_owner() {
        let bridge = Arc::new(SecretServiceBridge::spawn(Box::new(CoreSecretStore::new())));
        let prefs = Preferences::global(registry()).with_secret_bridge(bridge);

        assert!(!prefs.set_secure_string("password", "hunter2"));
        assert_eq!(prefs.get_secure_string("password", "fallback"), "fallback");
    }
}
