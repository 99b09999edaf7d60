use anyhow::{Context, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::Resumption;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::TunnelError;

/// 会话票据缓存容量（按服务器名称 LRU 淘汰）
pub const SESSION_CACHE_CAPACITY: usize = 256;

/// 构建连接远端使用的客户端 TLS 配置
///
/// - 内置容量为 [`SESSION_CACHE_CAPACITY`] 的会话缓存，重复连接同一远端时复用票据
/// - `strict_secure` 为 false 时完全跳过证书校验
/// - 严格模式下若提供 `ca_cert_path` 则只信任该文件中的证书，否则使用系统证书
pub fn build_client_config(
    strict_secure: bool,
    ca_cert_path: Option<&Path>,
) -> Result<Arc<rustls::ClientConfig>> {
    let builder = rustls::ClientConfig::builder();

    let mut config = if strict_secure {
        let root_store = load_root_store(ca_cert_path)?;
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        if ca_cert_path.is_some() {
            warn!("CA certificate is ignored because certificate verification is disabled");
        }
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
            .with_no_client_auth()
    };

    config.resumption = Resumption::in_memory_sessions(SESSION_CACHE_CAPACITY);

    Ok(Arc::new(config))
}

fn load_root_store(ca_cert_path: Option<&Path>) -> Result<rustls::RootCertStore> {
    let mut root_store = rustls::RootCertStore::empty();

    if let Some(ca_path) = ca_cert_path {
        // 加载自定义 CA 证书
        let ca_file = File::open(ca_path)
            .with_context(|| format!("Failed to open CA cert file: {:?}", ca_path))?;
        let mut ca_reader = BufReader::new(ca_file);
        let ca_certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut ca_reader)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse CA certificates")?;

        if ca_certs.is_empty() {
            anyhow::bail!("No certificate found in {:?}", ca_path);
        }
        for cert in ca_certs {
            root_store
                .add(cert)
                .context("Failed to add CA certificate")?;
        }
    } else {
        // 使用系统 CA 证书
        let native_certs = rustls_native_certs::load_native_certs();
        for err in &native_certs.errors {
            debug!("Skipping unreadable platform certificate: {}", err);
        }
        let (added, ignored) = root_store.add_parsable_certificates(native_certs.certs);
        debug!("Loaded {} platform CA certificates ({} ignored)", added, ignored);
    }

    Ok(root_store)
}

/// 从 `host:port` 形式的远端地址中取出主机部分，IPv6 的方括号会被去掉
pub fn host_of(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match addr.rsplit_once(':') {
        Some((host, _port)) if !host.contains(':') => host,
        _ => addr,
    }
}

/// 确定握手使用的服务器名称：优先使用显式指定的名称，否则取远端地址的主机部分
pub fn server_name_for(
    remote_addr: &str,
    override_name: Option<&str>,
) -> Result<ServerName<'static>, TunnelError> {
    let host = override_name.unwrap_or_else(|| host_of(remote_addr));
    ServerName::try_from(host.to_string())
        .map_err(|_| TunnelError::InvalidServerName(host.to_string()))
}

/// 不验证证书的验证器，对应 `strict_secure = false`
#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
