//! Persistent device store.
//!
//! One SQLite table of linked devices. The identity secret is kept AES-256-GCM
//! encrypted at rest, keyed by a machine/path-scoped digest, so a copied
//! database file is useless on another host.

use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Result, VoxrelayError};
use crate::jid::{self, Jid};

/// A device row: the identity this process presents to the protocol layer.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: String,
    /// Account the device is linked to; `None` until pairing completes.
    pub jid: Option<Jid>,
    /// Random 32-byte identity secret, decrypted from the store.
    pub identity_secret: Vec<u8>,
    pub registered_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// A fresh, unpaired device with a random identity secret.
    pub fn generate() -> Self {
        let mut secret = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self {
            id: new_id("dev"),
            jid: None,
            identity_secret: secret,
            registered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceStore {
    db_path: PathBuf,
    cipher: SecretCipher,
}

impl DeviceStore {
    /// Open the store at `address`, validating the requested dialect.
    ///
    /// Only SQLite is supported; the address accepts the `file:` prefix and
    /// query-string options of common SQLite URIs and reduces them to a path.
    pub fn open(dialect: &str, address: &str) -> Result<Self> {
        match dialect {
            "sqlite" | "sqlite3" => {}
            other => return Err(VoxrelayError::UnsupportedDialect(other.to_string())),
        }

        let raw = address.strip_prefix("file:").unwrap_or(address);
        let path = raw.split_once('?').map_or(raw, |(p, _)| p);
        let db_path = PathBuf::from(path);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            cipher: SecretCipher::new(&db_path),
            db_path,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS devices (
              id TEXT PRIMARY KEY,
              jid TEXT,
              secret_enc TEXT NOT NULL,
              registered_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Return the oldest stored device, creating one if the table is empty.
    pub fn get_or_create_first_device(&self) -> Result<DeviceRecord> {
        let conn = self.conn()?;
        let existing = conn
            .query_row(
                "SELECT id, jid, secret_enc, registered_at
                 FROM devices ORDER BY registered_at ASC, id ASC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        if let Some((id, jid_raw, secret_enc, registered_at)) = existing {
            let identity_secret = self.cipher.decrypt(&secret_enc).ok_or_else(|| {
                VoxrelayError::DeviceSecret(format!("stored secret for {id} cannot be decrypted"))
            })?;
            let jid = jid_raw.and_then(|raw| match jid::parse_recipient(&raw) {
                Ok(jid) => Some(jid),
                Err(e) => {
                    warn!(error = %e, device_id = %id, "ignoring malformed stored jid");
                    None
                }
            });
            return Ok(DeviceRecord {
                id,
                jid,
                identity_secret,
                registered_at: Utc
                    .timestamp_opt(registered_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }

        let device = DeviceRecord::generate();
        let secret_enc = self.cipher.encrypt(&device.identity_secret)?;
        conn.execute(
            "INSERT INTO devices (id, jid, secret_enc, registered_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                device.id,
                Option::<String>::None,
                secret_enc,
                device.registered_at.timestamp()
            ],
        )?;
        Ok(device)
    }

    /// Record (or clear, on logout) the account a device is linked to.
    pub fn set_paired_jid(&self, device_id: &str, jid: Option<&Jid>) -> Result<()> {
        self.conn()?.execute(
            "UPDATE devices SET jid = ?1 WHERE id = ?2",
            params![jid.map(Jid::to_string), device_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    fn new(scope: &Path) -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_default();
        let material = format!(
            "{username}|{host}|{}|voxrelay-device-v1",
            scope.to_string_lossy()
        );
        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest[..32]);
        Self { key }
    }

    fn encrypt(&self, plain: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| VoxrelayError::DeviceSecret(e.to_string()))?;
        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let encrypted = cipher
            .encrypt(nonce, plain)
            .map_err(|e| VoxrelayError::DeviceSecret(e.to_string()))?;
        let mut out = Vec::with_capacity(12 + encrypted.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&encrypted);
        Ok(BASE64.encode(out))
    }

    fn decrypt(&self, encoded: &str) -> Option<Vec<u8>> {
        let bytes = BASE64.decode(encoded).ok()?;
        if bytes.len() <= 12 {
            return None;
        }
        let (nonce_bytes, cipher_bytes) = bytes.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new_from_slice(&self.key).ok()?;
        cipher.decrypt(nonce, cipher_bytes).ok()
    }
}

fn new_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:08x}",
        Utc::now().timestamp_micros(),
        rand::random::<u32>()
    )
}
