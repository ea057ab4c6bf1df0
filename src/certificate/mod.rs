//! certificate/mod.rs
//!
//! Loads the combined certificate + encrypted key file the gateway expects
//! the client to present. The file holds the certificate chain (leaf first)
//! followed by one encrypted RSA private key, either legacy OpenSSL
//! (`DEK-Info`) or PKCS#8 (`ENCRYPTED PRIVATE KEY`).

pub mod legacy;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use pem::Pem;
use pkcs8::{EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use thiserror::Error;
use tokio::fs;
use tokio_rustls::rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer,
};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const ENCRYPTED_PKCS8_TAG: &str = "ENCRYPTED PRIVATE KEY";

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

// -----------------------------------------------------------------------------
// ----- CertificateBundle -----------------------------------------------------

pub struct CertificateBundle {
    chain: Vec<CertificateDer<'static>>,
    private_key: RsaPrivateKey,
    key_der: PrivateKeyDer<'static>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEncoding {
    Pkcs1,
    Pkcs8,
}

impl CertificateBundle {
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// The client certificate itself. The chain is never empty.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Decrypted key in the encoding it was stored in, ready for rustls.
    pub fn key_der(&self) -> PrivateKeyDer<'static> {
        self.key_der.clone_key()
    }

    pub fn key_encoding(&self) -> KeyEncoding {
        match self.key_der {
            PrivateKeyDer::Pkcs1(_) => KeyEncoding::Pkcs1,
            _ => KeyEncoding::Pkcs8,
        }
    }

    pub fn leaf_modulus(&self) -> Option<BigUint> {
        rsa_modulus(self.leaf()).ok().flatten()
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("chain_len", &self.chain.len())
            .field("key_encoding", &self.key_encoding())
            .field("key_bits", &(self.private_key.size() * 8))
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Loader: Exported ------------------------------------------------------

/// Reads `path` and hands the bytes to [`load`].
pub async fn load_file(
    path: impl AsRef<Path>,
    passphrase: &str,
) -> Result<CertificateBundle, CertificateError> {
    let path = path.as_ref();
    let raw = fs::read(path).await.map_err(|e| CertificateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load(&raw, passphrase)
}

/// Parses the chain and key, decrypts the key and checks it belongs to the
/// leaf certificate. Never returns a partial bundle.
pub fn load(pem_bytes: &[u8], passphrase: &str) -> Result<CertificateBundle, CertificateError> {
    let blocks = pem::parse_many(pem_bytes)
        .map_err(|e| CertificateError::MalformedCertificate(format!("invalid PEM data: {e}")))?;

    let mut chain = Vec::new();
    let mut key_block = None;
    for block in blocks {
        if block.tag() != CERTIFICATE_TAG {
            key_block = Some(block);
            break;
        }
        chain.push(CertificateDer::from(block.into_contents()));
    }

    if chain.is_empty() {
        return Err(CertificateError::MalformedCertificate(
            "no CERTIFICATE block found".into(),
        ));
    }

    let key_block = key_block.ok_or_else(|| {
        CertificateError::MalformedKey("no private key block follows the certificates".into())
    })?;

    let plaintext = decrypt_key_block(&key_block, passphrase)?;
    let (private_key, key_der) = parse_private_key(plaintext)?;

    verify_leaf_matches(&chain[0], &private_key)?;

    Ok(CertificateBundle {
        chain,
        private_key,
        key_der,
    })
}

// -----------------------------------------------------------------------------
// ----- Loader: Private helpers -----------------------------------------------

fn decrypt_key_block(block: &Pem, passphrase: &str) -> Result<Vec<u8>, CertificateError> {
    if legacy::is_encrypted(block) {
        return legacy::decrypt(block, passphrase.as_bytes())
            .map_err(|e| CertificateError::WrongPassphrase(e.to_string()));
    }

    if block.tag() == ENCRYPTED_PKCS8_TAG {
        let info = EncryptedPrivateKeyInfo::try_from(block.contents()).map_err(|e| {
            CertificateError::WrongPassphrase(format!("unreadable encrypted key: {e}"))
        })?;
        let document = info
            .decrypt(passphrase)
            .map_err(|e| CertificateError::WrongPassphrase(e.to_string()))?;
        return Ok(document.as_bytes().to_vec());
    }

    Err(CertificateError::WrongPassphrase(format!(
        "{} block is not encrypted",
        block.tag()
    )))
}

/// PKCS#1 first, then PKCS#8. Neither attempt has side effects.
fn parse_private_key(
    der: Vec<u8>,
) -> Result<(RsaPrivateKey, PrivateKeyDer<'static>), CertificateError> {
    let pkcs1_err = match RsaPrivateKey::from_pkcs1_der(&der) {
        Ok(key) => return Ok((key, PrivatePkcs1KeyDer::from(der).into())),
        Err(e) => e,
    };

    let key = {
        let info = PrivateKeyInfo::try_from(der.as_slice()).map_err(|pkcs8_err| {
            CertificateError::MalformedKey(format!(
                "neither PKCS#1 ({pkcs1_err}) nor PKCS#8 ({pkcs8_err})"
            ))
        })?;

        if info.algorithm.oid != RSA_ENCRYPTION {
            return Err(CertificateError::UnsupportedKeyType(
                info.algorithm.oid.to_string(),
            ));
        }

        RsaPrivateKey::try_from(info)
            .map_err(|e| CertificateError::MalformedKey(format!("PKCS#8 RSA key: {e}")))?
    };

    Ok((key, PrivatePkcs8KeyDer::from(der).into()))
}

fn verify_leaf_matches(
    leaf: &CertificateDer<'_>,
    key: &RsaPrivateKey,
) -> Result<(), CertificateError> {
    match rsa_modulus(leaf)? {
        Some(modulus) if &modulus == key.n() => Ok(()),
        _ => Err(CertificateError::KeyMismatch),
    }
}

/// `Ok(None)` when the certificate parses but its key is not RSA.
fn rsa_modulus(cert: &CertificateDer<'_>) -> Result<Option<BigUint>, CertificateError> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|e| CertificateError::MalformedCertificate(format!("leaf certificate: {e}")))?;

    match parsed.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Ok(Some(BigUint::from_bytes_be(rsa.modulus))),
        _ => Ok(None),
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to parse certificate PEM data: {0}")]
    MalformedCertificate(String),

    #[error("failed to parse key PEM data: {0}")]
    MalformedKey(String),

    #[error("passphrase: {0}")]
    WrongPassphrase(String),

    #[error("found non-RSA private key ({0}) in PKCS#8 wrapping")]
    UnsupportedKeyType(String),

    #[error("private key does not match public key")]
    KeyMismatch,

    #[error("failed to load trust roots: {0}")]
    RootStore(String),

    #[error("read error for {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
