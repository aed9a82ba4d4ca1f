use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use openssl::{
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
};
use x509_parser::{extensions::GeneralName, pem::parse_x509_pem};

const PEM_CERTIFICATE: &str = "CERTIFICATE";

/// The key type of the issued certificate. Independent of the account key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CertificateKeyType {
    /// 2048-bit RSA
    Rsa2048,
    /// 4096-bit RSA
    #[default]
    Rsa4096,
    /// ECDSA on the NIST P-256 curve
    EcP256,
    /// ECDSA on the NIST P-384 curve
    EcP384,
}

impl CertificateKeyType {
    /// Generate a fresh private key of this type
    pub fn generate(self) -> Result<PKey<Private>> {
        let key = match self {
            Self::Rsa2048 => PKey::from_rsa(Rsa::generate(2048)?)?,
            Self::Rsa4096 => PKey::from_rsa(Rsa::generate(4096)?)?,
            Self::EcP256 => ec_key(Nid::X9_62_PRIME256V1)?,
            Self::EcP384 => ec_key(Nid::SECP384R1)?,
        };
        Ok(key)
    }
}

/// Generate an elliptic-curve private key on the named curve
pub(crate) fn ec_key(curve: Nid) -> Result<PKey<Private>> {
    let group = EcGroup::from_curve_name(curve)?;
    Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
}

/// An issued certificate, as the raw artifacts that get written to disk
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertificateResource {
    /// The domains the certificate was requested for
    pub domains: Vec<String>,
    /// The certificate's private key in PEM PKCS#8 format
    pub private_key: Vec<u8>,
    /// The issued certificate in PEM format, followed by the issuer chain when bundled
    pub certificate: Vec<u8>,
    /// The issuer chain in PEM format
    pub issuer_certificate: Vec<u8>,
    /// The certificate signing request in PEM format
    pub csr: Vec<u8>,
}

impl CertificateResource {
    /// Parse the leaf certificate for its storage metadata
    #[inline(always)]
    pub fn metadata(&self) -> Result<CertificateMetadata> {
        extract_metadata(&self.certificate)
    }
}

/// Details only recoverable by parsing the leaf certificate
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateMetadata {
    /// The domain the certificate is filed under
    pub domain: String,
    /// When the certificate starts being valid
    pub not_before: DateTime<Utc>,
}

/// Extract the domain and not-before date from the first PEM block of a certificate.
///
/// The domain is the subject common name when it is present and non-empty, otherwise the
/// first DNS subject alternative name.
pub fn extract_metadata(certificate: &[u8]) -> Result<CertificateMetadata> {
    let (_, pem) = parse_x509_pem(certificate).map_err(|_| Error::MissingPemBlock)?;
    if pem.label != PEM_CERTIFICATE {
        return Err(Error::NotACertificate(pem.label));
    }

    let x509 = pem
        .parse_x509()
        .map_err(|e| Error::MalformedCertificate(e.to_string()))?;

    let common_name = x509
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .filter(|cn| !cn.is_empty());

    let domain = match common_name {
        Some(cn) => cn.to_owned(),
        None => {
            let san = x509
                .subject_alternative_name()
                .map_err(|e| Error::MalformedCertificate(e.to_string()))?;

            san.and_then(|ext| {
                ext.value.general_names.iter().find_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
            })
            .ok_or(Error::MissingDomain)?
        }
    };

    let timestamp = x509.validity().not_before.timestamp();
    let not_before = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| Error::MalformedCertificate(format!("invalid notBefore {timestamp}")))?;

    Ok(CertificateMetadata { domain, not_before })
}
