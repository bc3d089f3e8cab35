//! 凭据加解密与连接指纹

pub mod codec;
pub mod fingerprint;

pub use codec::CredentialCodec;
pub use fingerprint::{fingerprint, Fingerprint};
