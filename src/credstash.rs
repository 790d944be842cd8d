//! Credstash lookups against DynamoDB and KMS.
//!
//! Each credential is a DynamoDB item keyed by `name` and `version` carrying a
//! KMS-wrapped 64 byte key, the AES-256-CTR ciphertext and an HMAC of that ciphertext.
//! The first half of the unwrapped key encrypts, the second half authenticates.

use std::collections::HashMap;

use aes::Aes256;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_kms::primitives::Blob;
use base64::{Engine, engine::general_purpose::STANDARD};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac, digest::KeyInit};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::resolver::{ResolveError, SecretResolver};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Initial counter block: a 128 bit big endian counter starting at one.
const NONCE: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

const DEFAULT_DIGEST: &str = "SHA256";

pub struct CredstashResolver {
    dynamodb: aws_sdk_dynamodb::Client,
    kms: aws_sdk_kms::Client,
}

impl CredstashResolver {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            dynamodb: aws_sdk_dynamodb::Client::new(sdk_config),
            kms: aws_sdk_kms::Client::new(sdk_config),
        }
    }

    async fn unwrap_key(&self, wrapped: Vec<u8>) -> Result<Vec<u8>, ResolveError> {
        let output = self
            .kms
            .decrypt()
            .ciphertext_blob(Blob::new(wrapped))
            .send()
            .await
            .map_err(|e| {
                ResolveError::Communication(aws_sdk_kms::error::DisplayErrorContext(e).to_string())
            })?;

        output
            .plaintext
            .map(Blob::into_inner)
            .ok_or_else(|| ResolveError::Corrupt("KMS returned no plaintext".to_owned()))
    }
}

#[async_trait]
impl SecretResolver for CredstashResolver {
    async fn resolve(
        &self,
        name: &str,
        table: &str,
        version: &str,
    ) -> Result<Vec<u8>, ResolveError> {
        debug!("Fetching '{}' version {} from table '{}'", name, version, table);

        let output = self
            .dynamodb
            .get_item()
            .table_name(table)
            .key("name", AttributeValue::S(name.to_owned()))
            .key("version", AttributeValue::S(version.to_owned()))
            .send()
            .await
            .map_err(|e| {
                ResolveError::Communication(
                    aws_sdk_dynamodb::error::DisplayErrorContext(e).to_string(),
                )
            })?;

        let material = Material::from_item(&output.item.ok_or(ResolveError::NotFound)?)?;
        let key = self.unwrap_key(material.wrapped_key.clone()).await?;

        material.open(&key)
    }
}

/// The encrypted fields of a credstash item.
#[derive(Debug)]
struct Material {
    wrapped_key: Vec<u8>,
    contents: Vec<u8>,
    hmac: Vec<u8>,
    digest: String,
}

impl Material {
    fn from_item(item: &HashMap<String, AttributeValue>) -> Result<Self, ResolveError> {
        let wrapped_key = decode_base64(string_attribute(item, "key")?)?;
        let contents = decode_base64(string_attribute(item, "contents")?)?;

        // Older writers store the hex digest as a string, newer ones as binary.
        let hmac = match item.get("hmac") {
            Some(AttributeValue::S(s)) => hex::decode(s),
            Some(AttributeValue::B(b)) => hex::decode(b.clone().into_inner()),
            _ => return Err(ResolveError::Corrupt("missing attribute 'hmac'".to_owned())),
        }
        .map_err(|e| ResolveError::Corrupt(format!("hmac is not hex: {e}")))?;

        let digest = match item.get("digest") {
            Some(AttributeValue::S(s)) => s.clone(),
            _ => DEFAULT_DIGEST.to_owned(),
        };

        Ok(Self {
            wrapped_key,
            contents,
            hmac,
            digest,
        })
    }

    /// Verifies and decrypts the contents with the unwrapped KMS key.
    fn open(&self, key: &[u8]) -> Result<Vec<u8>, ResolveError> {
        if key.len() % 2 != 0 || key.is_empty() {
            return Err(ResolveError::Corrupt(format!(
                "unexpected data key length {}",
                key.len()
            )));
        }
        let (data_key, hmac_key) = key.split_at(key.len() / 2);

        match self.digest.as_str() {
            "SHA224" => verify::<Hmac<Sha224>>(hmac_key, &self.contents, &self.hmac)?,
            "SHA256" => verify::<Hmac<Sha256>>(hmac_key, &self.contents, &self.hmac)?,
            "SHA384" => verify::<Hmac<Sha384>>(hmac_key, &self.contents, &self.hmac)?,
            "SHA512" => verify::<Hmac<Sha512>>(hmac_key, &self.contents, &self.hmac)?,
            other => {
                return Err(ResolveError::Corrupt(format!("unsupported digest {other}")));
            }
        }

        let mut cipher = Aes256Ctr::new_from_slices(data_key, &NONCE)
            .map_err(|_| ResolveError::Corrupt("data key is not 256 bits".to_owned()))?;
        let mut plaintext = self.contents.clone();
        cipher.apply_keystream(&mut plaintext);

        Ok(plaintext)
    }
}

fn verify<M: Mac + KeyInit>(key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), ResolveError> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| ResolveError::Corrupt("invalid hmac key".to_owned()))?;
    mac.update(data);
    mac.verify_slice(expected)
        .map_err(|_| ResolveError::Corrupt("hmac mismatch".to_owned()))
}

fn string_attribute<'a>(
    item: &'a HashMap<String, AttributeValue>,
    name: &str,
) -> Result<&'a str, ResolveError> {
    match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s),
        _ => Err(ResolveError::Corrupt(format!("missing attribute '{name}'"))),
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>, ResolveError> {
    STANDARD
        .decode(value)
        .map_err(|e| ResolveError::Corrupt(format!("invalid base64: {e}")))
}
