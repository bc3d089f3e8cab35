use base64::{engine::general_purpose, Engine as _};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use tracing::warn;

use crate::{HubError, HubResult};

/// 凭据编解码器
///
/// AES-256-GCM，密文格式为 `base64(nonce || ciphertext || tag)`，不带版本号。
#[derive(Clone)]
pub struct CredentialCodec {
    key: [u8; 32],
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// 从 base64 编码的32字节密钥构造
    pub fn from_base64_key(encoded: &str) -> HubResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| HubError::config_error(format!("加密密钥不是有效的base64: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HubError::config_error("加密密钥长度必须为32字节"))?;
        Ok(Self::new(key))
    }

    /// 生成随机密钥，返回 base64 编码
    pub fn generate_key() -> HubResult<String> {
        let mut key = [0u8; 32];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|e| HubError::internal(format!("生成加密密钥失败: {e}")))?;
        Ok(general_purpose::STANDARD.encode(key))
    }

    fn cipher(&self) -> HubResult<LessSafeKey> {
        let unbound = UnboundKey::new(&aead::AES_256_GCM, &self.key)
            .map_err(|e| HubError::internal(format!("创建加密密钥失败: {e}")))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// 加密明文，空字符串原样返回
    pub fn encrypt(&self, plaintext: &str) -> HubResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|e| HubError::internal(format!("生成随机数失败: {e}")))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.cipher()?
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
            .map_err(|e| HubError::internal(format!("加密失败: {e}")))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&in_out);
        Ok(general_purpose::STANDARD.encode(result))
    }

    /// 解密密文，格式错误或密钥不匹配时返回 `None`
    pub fn try_decrypt(&self, encoded: &str) -> Option<String> {
        if encoded.is_empty() {
            return Some(String::new());
        }

        let data = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
        if data.len() <= NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).ok()?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self.cipher().ok()?.open_in_place(nonce, Aad::empty(), &mut in_out).ok()?;
        String::from_utf8(plaintext.to_vec()).ok()
    }

    /// 解密密文，失败时返回空字符串
    ///
    /// 展示路径可以容忍缺失的密码，所以这里从不返回错误。
    pub fn decrypt(&self, encoded: &str) -> String {
        match self.try_decrypt(encoded) {
            Some(plain) => plain,
            None => {
                warn!("凭据解密失败，按空密码处理");
                String::new()
            }
        }
    }
}
