use serde::{Deserialize, Serialize};

use crate::security::CredentialCodec;

/// 凭据加密配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// base64 编码的32字节 AES-256 密钥
    pub encryption_key: String,
}

impl SecurityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.encryption_key.is_empty() {
            return Err(anyhow::anyhow!("加密密钥不能为空"));
        }
        CredentialCodec::from_base64_key(&self.encryption_key)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(())
    }

    pub fn codec(&self) -> anyhow::Result<CredentialCodec> {
        CredentialCodec::from_base64_key(&self.encryption_key).map_err(|e| anyhow::anyhow!("{}", e))
    }
}
