/// Signing Keypair Management
///
/// Loads the RSA keypair from two PEM files, generating and persisting a fresh
/// pair when either file is missing. After construction the keypair is
/// read-only; only the public half is ever handed out.

use std::fs;
use std::path::{Path, PathBuf};

use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::configuration::{KeySettings, MIN_KEY_BITS};
use crate::error::KeyError;

/// The only algorithm tokens are signed and accepted with.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS512;

const SELF_CHECK_MESSAGE: &[u8] = b"tokenkeeper-keypair-check";

pub struct KeyManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_pem: String,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Load the persisted keypair, or generate and persist one on first run.
    ///
    /// # Errors
    /// - `KeyError::Generation` if the RSA keypair cannot be generated
    /// - `KeyError::Persistence` if the files cannot be written, read, parsed,
    ///   or do not belong together
    pub fn ensure_keypair(settings: &KeySettings) -> Result<Self, KeyError> {
        let private_path = PathBuf::from(&settings.private_key_path);
        let public_path = PathBuf::from(&settings.public_key_path);

        if !private_path.exists() || !public_path.exists() {
            tracing::info!(
                private_key = %private_path.display(),
                public_key = %public_path.display(),
                bits = settings.bits,
                "No signing keypair found, generating a new one"
            );
            let (private_pem, public_pem) = generate_pem_pair(settings.bits)?;
            write_key_file(&private_path, &private_pem, true)?;
            write_key_file(&public_path, &public_pem, false)?;
        }

        let private_pem = read_key_file(&private_path)?;
        let public_pem = read_key_file(&public_path)?;
        let manager = Self::from_pem(&private_pem, &public_pem)?;

        tracing::info!(public_key = %public_path.display(), "Signing keypair loaded");
        Ok(manager)
    }

    /// Generate an in-memory keypair that is never written to disk.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let (private_pem, public_pem) = generate_pem_pair(bits)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    /// Build from PEM text: PKCS#1 or PKCS#8 private key, SPKI public key.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::Persistence(format!("invalid private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| KeyError::Persistence(format!("invalid public key: {}", e)))?;

        let manager = Self {
            encoding,
            decoding,
            public_pem: public_pem.to_string(),
        };
        manager.check_pair()?;
        Ok(manager)
    }

    /// PEM-encoded public key, safe to export to third-party verifiers.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    fn check_pair(&self) -> Result<(), KeyError> {
        let signature = crypto::sign(SELF_CHECK_MESSAGE, &self.encoding, SIGNING_ALGORITHM)
            .map_err(|e| KeyError::Persistence(format!("private key cannot sign: {}", e)))?;
        let matches = crypto::verify(&signature, SELF_CHECK_MESSAGE, &self.decoding, SIGNING_ALGORITHM)
            .unwrap_or(false);
        if !matches {
            return Err(KeyError::Persistence(
                "public key does not match private key".to_string(),
            ));
        }
        Ok(())
    }
}

fn generate_pem_pair(bits: usize) -> Result<(String, String), KeyError> {
    if bits < MIN_KEY_BITS {
        return Err(KeyError::Generation(format!(
            "refusing to generate a {}-bit key (minimum {})",
            bits, MIN_KEY_BITS
        )));
    }

    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(format!("cannot encode private key: {}", e)))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(format!("cannot encode public key: {}", e)))?;

    Ok((private_pem.to_string(), public_pem))
}

fn write_key_file(path: &Path, contents: &str, private: bool) -> Result<(), KeyError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            KeyError::Persistence(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    fs::write(path, contents)
        .map_err(|e| KeyError::Persistence(format!("cannot write {}: {}", path.display(), e)))?;

    if private {
        restrict_to_owner(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| KeyError::Persistence(format!("cannot restrict {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path)
        .map_err(|e| KeyError::Persistence(format!("cannot read {}: {}", path.display(), e)))
}
