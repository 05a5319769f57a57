/*
 * Secure-credential storage. The underlying secret service is modelled by
 * `SecretStoreOperations`: a create/find store indexed by string attributes,
 * the way OS keyrings match entries. Such backends are typically only safe to
 * call from one designated thread, so all operations are funneled through
 * `SecretServiceBridge`, which owns a single worker thread and offers a
 * synchronous API with a bounded wait.
 *
 * `CoreSecretStore` is the process-local in-memory implementation; a durable
 * OS keyring backend would implement the same trait without changing the
 * bridge or its callers.
 */
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// How long a caller blocks on the worker before giving up.
pub const SECURE_OP_TIMEOUT: Duration = Duration::from_millis(1000);

pub type SecretAttributes = HashMap<String, String>;

#[derive(Debug)]
pub enum SecureStoreError {
    BackendUnavailable,
    Backend(String),
}

impl std::fmt::Display for SecureStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecureStoreError::BackendUnavailable => {
                write!(f, "Secure store backend is unavailable")
            }
            SecureStoreError::Backend(msg) => write!(f, "Secure store backend error: {msg}"),
        }
    }
}

impl std::error::Error for SecureStoreError {}

pub type Result<T> = std::result::Result<T, SecureStoreError>;

pub trait SecretStoreOperations: Send {
    /// Creates or replaces the secret stored under exactly these attributes.
    fn store(&mut self, attributes: &SecretAttributes, secret: &str) -> Result<()>;
    /// Returns the first stored secret whose attributes contain all requested pairs.
    fn find(&self, attributes: &SecretAttributes) -> Result<Option<String>>;
}

pub struct CoreSecretStore {
    entries: Vec<(SecretAttributes, String)>,
}

impl CoreSecretStore {
    pub fn new() -> Self {
        CoreSecretStore {
            entries: Vec::new(),
        }
    }
}

impl Default for CoreSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStoreOperations for CoreSecretStore {
    fn store(&mut self, attributes: &SecretAttributes, secret: &str) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|(attrs, _)| attrs == attributes) {
            entry.1 = secret.to_string();
        } else {
            self.entries.push((attributes.clone(), secret.to_string()));
        }
        Ok(())
    }

    fn find(&self, attributes: &SecretAttributes) -> Result<Option<String>> {
        let found = self.entries.iter().find(|(attrs, _)| {
            attributes
                .iter()
                .all(|(key, value)| attrs.get(key) == Some(value))
        });
        Ok(found.map(|(_, secret)| secret.clone()))
    }
}

enum SecretRequest {
    Store {
        attributes: SecretAttributes,
        secret: String,
        reply: mpsc::Sender<bool>,
    },
    Find {
        attributes: SecretAttributes,
        reply: mpsc::Sender<Option<String>>,
    },
}

/*
 * Bridges callers on arbitrary threads to a backend confined to one worker
 * thread. Each operation sends a request and blocks on its reply channel for
 * at most `SECURE_OP_TIMEOUT`; a backend that never answers costs the caller
 * one second, not a hang. The `op_gate` mutex serializes callers so at most
 * one secure operation per bridge is in flight at a time.
 */
pub struct SecretServiceBridge {
    sender: mpsc::Sender<SecretRequest>,
    op_gate: Mutex<()>,
}

impl SecretServiceBridge {
    pub fn spawn(mut backend: Box<dyn SecretStoreOperations>) -> Self {
        let (sender, receiver) = mpsc::channel::<SecretRequest>();
        let spawn_result = thread::Builder::new()
            .name("docky-secret-store".to_string())
            .spawn(move || {
                for request in receiver {
                    match request {
                        SecretRequest::Store {
                            attributes,
                            secret,
                            reply,
                        } => {
                            let ok = match backend.store(&attributes, &secret) {
                                Ok(()) => true,
                                Err(e) => {
                                    log::warn!("SecretServiceBridge: Backend store failed: {e}");
                                    false
                                }
                            };
                            let _ = reply.send(ok);
                        }
                        SecretRequest::Find { attributes, reply } => {
                            let found = match backend.find(&attributes) {
                                Ok(found) => found,
                                Err(e) => {
                                    log::warn!("SecretServiceBridge: Backend find failed: {e}");
                                    None
                                }
                            };
                            let _ = reply.send(found);
                        }
                    }
                }
                log::debug!("SecretServiceBridge: Worker thread exiting");
            });
        if let Err(e) = spawn_result {
            // The receiver was moved into the dead closure, so later sends
            // fail and callers see BackendUnavailable.
            log::error!("SecretServiceBridge: Failed to spawn worker thread: {e}");
        }
        SecretServiceBridge {
            sender,
            op_gate: Mutex::new(()),
        }
    }

    fn attributes_for(key_path: &str) -> SecretAttributes {
        let mut attributes = SecretAttributes::new();
        attributes.insert("key".to_string(), key_path.to_string());
        attributes
    }

    /*
     * Stores `secret` under the absolute preference path. Returns Ok(false)
     * when the worker did not answer within the bounded wait or the backend
     * rejected the write; Err only when the worker is gone entirely.
     */
    pub fn store_secret(&self, key_path: &str, secret: &str) -> Result<bool> {
        let _guard = self.op_gate.lock().unwrap_or_else(|e| e.into_inner());
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = SecretRequest::Store {
            attributes: Self::attributes_for(key_path),
            secret: secret.to_string(),
            reply: reply_tx,
        };
        self.sender
            .send(request)
            .map_err(|_| SecureStoreError::BackendUnavailable)?;
        match reply_rx.recv_timeout(SECURE_OP_TIMEOUT) {
            Ok(ok) => Ok(ok),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "SecretServiceBridge: Store of '{key_path}' timed out after {SECURE_OP_TIMEOUT:?}"
                );
                Ok(false)
            }
            Err(RecvTimeoutError::Disconnected) => Err(SecureStoreError::BackendUnavailable),
        }
    }

    /// Looks up the secret stored under the absolute preference path, with the
    /// same bounded-wait discipline as `store_secret`.
    pub fn lookup_secret(&self, key_path: &str) -> Result<Option<String>> {
        let _guard = self.op_gate.lock().unwrap_or_else(|e| e.into_inner());
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = SecretRequest::Find {
            attributes: Self::attributes_for(key_path),
            reply: reply_tx,
        };
        self.sender
            .send(request)
            .map_err(|_| SecureStoreError::BackendUnavailable)?;
        match reply_rx.recv_timeout(SECURE_OP_TIMEOUT) {
            Ok(found) => Ok(found),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "SecretServiceBridge: Lookup of '{key_path}' timed out after {SECURE_OP_TIMEOUT:?}"
                );
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(SecureStoreError::BackendUnavailable),
        }
    }
}
