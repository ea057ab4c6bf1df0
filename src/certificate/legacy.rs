//! certificate/legacy.rs
//!
//! OpenSSL's pre-PKCS#8 PEM encryption: a `Proc-Type: 4,ENCRYPTED` header,
//! `DEK-Info: <cipher>,<iv hex>`, and a CBC-encrypted body whose key is
//! EVP_BytesToKey(MD5, 1 round) over the passphrase salted with the first
//! 8 IV bytes.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use pem::Pem;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const PROC_TYPE: &str = "Proc-Type";
const PROC_TYPE_ENCRYPTED: &str = "4,ENCRYPTED";
const DEK_INFO: &str = "DEK-Info";
const SALT_LEN: usize = 8;

// -----------------------------------------------------------------------------
// ----- Exported --------------------------------------------------------------

pub fn is_encrypted(block: &Pem) -> bool {
    block
        .headers()
        .get(PROC_TYPE)
        .is_some_and(|v| v.trim() == PROC_TYPE_ENCRYPTED)
}

pub fn decrypt(block: &Pem, passphrase: &[u8]) -> Result<Vec<u8>, LegacyError> {
    let dek_info = block
        .headers()
        .get(DEK_INFO)
        .ok_or(LegacyError::MissingDekInfo)?;

    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| LegacyError::MalformedDekInfo(dek_info.to_string()))?;

    let cipher = LegacyCipher::from_name(name.trim())?;
    let iv = hex::decode(iv_hex.trim())
        .map_err(|_| LegacyError::MalformedDekInfo(dek_info.to_string()))?;

    if iv.len() != cipher.block_size() {
        return Err(LegacyError::InvalidIv {
            expected: cipher.block_size(),
            actual: iv.len(),
        });
    }

    let data = block.contents();
    if data.is_empty() || data.len() % cipher.block_size() != 0 {
        return Err(LegacyError::NotBlockAligned);
    }

    let key = derive_key(passphrase, &iv[..SALT_LEN], cipher.key_len());
    cipher.decrypt(&key, &iv, data)
}

// -----------------------------------------------------------------------------
// ----- LegacyCipher ----------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LegacyCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    DesCbc,
}

impl LegacyCipher {
    fn from_name(name: &str) -> Result<Self, LegacyError> {
        match name {
            "AES-128-CBC" => Ok(LegacyCipher::Aes128Cbc),
            "AES-192-CBC" => Ok(LegacyCipher::Aes192Cbc),
            "AES-256-CBC" => Ok(LegacyCipher::Aes256Cbc),
            "DES-EDE3-CBC" => Ok(LegacyCipher::DesEde3Cbc),
            "DES-CBC" => Ok(LegacyCipher::DesCbc),
            other => Err(LegacyError::UnsupportedCipher(other.to_string())),
        }
    }

    fn key_len(self) -> usize {
        match self {
            LegacyCipher::Aes128Cbc => 16,
            LegacyCipher::Aes192Cbc => 24,
            LegacyCipher::Aes256Cbc => 32,
            LegacyCipher::DesEde3Cbc => 24,
            LegacyCipher::DesCbc => 8,
        }
    }

    fn block_size(self) -> usize {
        match self {
            LegacyCipher::Aes128Cbc | LegacyCipher::Aes192Cbc | LegacyCipher::Aes256Cbc => 16,
            LegacyCipher::DesEde3Cbc | LegacyCipher::DesCbc => 8,
        }
    }

    fn decrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, LegacyError> {
        match self {
            LegacyCipher::Aes128Cbc => decrypt_cbc::<cbc::Decryptor<aes::Aes128>>(key, iv, data),
            LegacyCipher::Aes192Cbc => decrypt_cbc::<cbc::Decryptor<aes::Aes192>>(key, iv, data),
            LegacyCipher::Aes256Cbc => decrypt_cbc::<cbc::Decryptor<aes::Aes256>>(key, iv, data),
            LegacyCipher::DesEde3Cbc => decrypt_cbc::<cbc::Decryptor<des::TdesEde3>>(key, iv, data),
            LegacyCipher::DesCbc => decrypt_cbc::<cbc::Decryptor<des::Des>>(key, iv, data),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LegacyError {
    #[error("no DEK-Info header in block")]
    MissingDekInfo,

    #[error("malformed DEK-Info header: {0}")]
    MalformedDekInfo(String),

    #[error("unknown encryption mode {0}")]
    UnsupportedCipher(String),

    #[error("IV is {actual} bytes, cipher needs {expected}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("encrypted PEM data is not a multiple of the block size")]
    NotBlockAligned,

    #[error("decryption password incorrect")]
    BadDecrypt,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn decrypt_cbc<D>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, LegacyError>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let decryptor = D::new_from_slices(key, iv).map_err(|_| LegacyError::InvalidIv {
        expected: iv.len(),
        actual: iv.len(),
    })?;

    // A wrong passphrase almost always shows up as bad PKCS#7 padding.
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| LegacyError::BadDecrypt)
}

/// EVP_BytesToKey with MD5 and a single iteration.
fn derive_key(passphrase: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(len + 16);
    let mut prev: Option<md5::Digest> = None;

    while key.len() < len {
        let mut ctx = md5::Context::new();
        if let Some(digest) = prev {
            ctx.consume(digest.0);
        }
        ctx.consume(passphrase);
        ctx.consume(salt);

        let digest = ctx.compute();
        key.extend_from_slice(&digest.0);
        prev = Some(digest);
    }

    key.truncate(len);
    key
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
