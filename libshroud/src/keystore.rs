//! Persistence boundary for the authority's blind-signature keypair.
//!
//! The core never decides where key material lives; callers inject a
//! [`KeyStore`] capability. The file-backed store keeps the private key as a
//! PKCS#8 PEM and the public half as the `{"n", "e"}` JSON object clients
//! fetch.

use crate::crypto::blind::{BlindKeyPair, BlindPublicKey, BlindSigError};
use log::{debug, info};
use rand::{CryptoRng, RngCore};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const PRIV_PEM_FILE: &str = "blind_priv.pem";
pub const PUB_JSON_FILE: &str = "blind_pub.json";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Key(#[from] BlindSigError),
}

pub trait KeyStore {
    /// Fetch the persisted keypair, or `None` if none has been saved yet.
    fn load(&self) -> Result<Option<BlindKeyPair>, KeyStoreError>;
    fn save(&self, keypair: &BlindKeyPair) -> Result<(), KeyStoreError>;
}

/// Directory-backed store holding `blind_priv.pem` and `blind_pub.json`.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Creates the store, making the directory if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn priv_path(&self) -> PathBuf {
        self.dir.join(PRIV_PEM_FILE)
    }

    fn pub_path(&self) -> PathBuf {
        self.dir.join(PUB_JSON_FILE)
    }

    /// Read just the public half, the way a client without the PEM does.
    pub fn load_public(&self) -> Result<Option<BlindPublicKey>, KeyStoreError> {
        let path = self.pub_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(BlindPublicKey::from_json(&json)?))
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<BlindKeyPair>, KeyStoreError> {
        let path = self.priv_path();
        if !path.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(&path)?;
        debug!("Loaded blind-signature key from {}", path.display());
        Ok(Some(BlindKeyPair::from_pem(&pem)?))
    }

    fn save(&self, keypair: &BlindKeyPair) -> Result<(), KeyStoreError> {
        fs::write(self.priv_path(), keypair.to_pem()?.as_bytes())?;
        fs::write(self.pub_path(), keypair.public().to_json()?)?;
        debug!("Saved blind-signature keypair under {}", self.dir.display());
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryKeyStore {
    keypair: Mutex<Option<BlindKeyPair>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<BlindKeyPair>, KeyStoreError> {
        let guard = self.keypair.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn save(&self, keypair: &BlindKeyPair) -> Result<(), KeyStoreError> {
        let mut guard = self.keypair.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(keypair.clone());
        Ok(())
    }
}

/// Return the stored keypair, generating and saving a fresh one if the store
/// is empty.
pub fn load_or_generate<S, R>(store: &S, bits: usize, rng: &mut R) -> Result<BlindKeyPair, KeyStoreError>
where
    S: KeyStore,
    R: CryptoRng + RngCore,
{
    if let Some(keypair) = store.load()? {
        debug!("Reusing persisted blind-signature keypair");
        return Ok(keypair);
    }
    let keypair = BlindKeyPair::generate(bits, rng)?;
    store.save(&keypair)?;
    info!("Provisioned new blind-signature keypair");
    Ok(keypair)
}
