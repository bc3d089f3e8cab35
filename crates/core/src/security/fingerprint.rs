use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 连接身份指纹（SHA-256 十六进制）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志中使用的短形式
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计算连接指纹
///
/// 字段顺序固定为 label, url, username, secret, version, ext，
/// 调整顺序会使所有已有连接池失效。每个字段带长度前缀，避免拼接歧义。
pub fn fingerprint(
    label: &str,
    url: &str,
    username: &str,
    secret: &str,
    version: Option<&str>,
    ext: bool,
) -> Fingerprint {
    let mut buf = Vec::with_capacity(label.len() + url.len() + username.len() + secret.len() + 64);
    for field in [label, url, username, secret] {
        push_field(&mut buf, Some(field));
    }
    push_field(&mut buf, version);
    buf.push(u8::from(ext));

    let hash = digest(&SHA256, &buf);
    let hex = hash.as_ref().iter().map(|b| format!("{b:02x}")).collect::<String>();
    Fingerprint(hex)
}

fn push_field(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(v) => {
            buf.push(1);
            buf.extend_from_slice(&(v.len() as u64).to_be_bytes());
            buf.extend_from_slice(v.as_bytes());
        }
        None => buf.push(0),
    }
}
