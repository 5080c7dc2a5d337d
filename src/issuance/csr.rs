//! PKCS#10 request parsing.

use std::fmt;

use thiserror::Error;
use x509_parser::{
    oid_registry::asn1_rs::Tag,
    prelude::{FromDer, X509CertificationRequest},
};

const CSR_LABELS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

#[derive(Debug, Error)]
pub enum CsrError {
    #[error("malformed CSR: {0}")]
    Malformed(String),
    #[error("CSR subject has no common name")]
    MissingCommonName,
    #[error("CSR common name '{name}' cannot be used as a file name: {reason}")]
    InvalidSubject { name: String, reason: String },
}

/// Common name of a CSR subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem the ACME client uses for this subject's certificate bundle.
    ///
    /// lego replaces `*` with `_` and `:` with `-`, then punycode-encodes
    /// non-ASCII labels. Case is preserved.
    pub fn artifact_file_name(&self) -> Result<String, CsrError> {
        let replaced = self.0.replace('*', "_").replace(':', "-");
        let labels = replaced
            .split('.')
            .map(|label| {
                if label.is_ascii() {
                    return Ok(label.to_string());
                }
                idna::punycode::encode_str(label)
                    .map(|encoded| format!("xn--{encoded}"))
                    .ok_or_else(|| CsrError::InvalidSubject {
                        name: self.0.clone(),
                        reason: format!("label '{label}' cannot be punycode-encoded"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels.join("."))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decodes a PEM CSR and returns the first common name of its subject.
pub fn parse(pem_bytes: &[u8]) -> Result<Subject, CsrError> {
    let block = pem::parse(pem_bytes)
        .map_err(|err| CsrError::Malformed(format!("invalid PEM: {err}")))?;
    if !CSR_LABELS.contains(&block.tag()) {
        return Err(CsrError::Malformed(format!(
            "unexpected PEM label '{}'",
            block.tag()
        )));
    }

    let (_, csr) = X509CertificationRequest::from_der(block.contents())
        .map_err(|err| CsrError::Malformed(format!("invalid PKCS#10 structure: {err}")))?;

    let attribute = csr
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .ok_or(CsrError::MissingCommonName)?;

    let value = attribute.attr_value();
    let name = match value.tag() {
        Tag::BmpString => decode_utf16(value.as_bytes())?,
        Tag::UniversalString => decode_utf32(value.as_bytes())?,
        _ => match attribute.as_str() {
            Ok(text) => text.to_string(),
            Err(_) => std::str::from_utf8(value.as_bytes())
                .map_err(|err| CsrError::Malformed(format!("common name is not text: {err}")))?
                .to_string(),
        },
    };
    if name.contains('\0') {
        return Err(CsrError::Malformed(
            "common name contains a NUL character".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(CsrError::MissingCommonName);
    }
    Ok(Subject(name))
}

/// BMPString values are UTF-16BE.
fn decode_utf16(bytes: &[u8]) -> Result<String, CsrError> {
    if bytes.len() % 2 != 0 {
        return Err(CsrError::Malformed(
            "BMPString common name has an odd length".to_string(),
        ));
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|err| CsrError::Malformed(format!("invalid UTF-16 common name: {err}")))
}

/// UniversalString values are UTF-32BE.
fn decode_utf32(bytes: &[u8]) -> Result<String, CsrError> {
    if bytes.len() % 4 != 0 {
        return Err(CsrError::Malformed(
            "UniversalString common name length is not a multiple of 4".to_string(),
        ));
    }
    bytes
        .chunks_exact(4)
        .map(|quad| {
            let code = u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]);
            char::from_u32(code).ok_or_else(|| {
                CsrError::Malformed(format!("invalid code point {code:#x} in common name"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        BmpString, CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, PrintableString,
        UniversalString,
    };

    fn csr_with_name(value: Option<DnValue>) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Example Org");
        if let Some(value) = value {
            params.distinguished_name.push(DnType::CommonName, value);
        }
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    #[test]
    fn extracts_utf8_common_name() {
        let pem = csr_with_name(Some(DnValue::Utf8String("example.com".into())));
        assert_eq!(parse(pem.as_bytes()).unwrap().as_str(), "example.com");
    }

    #[test]
    fn extracts_printable_common_name() {
        let value = PrintableString::try_from("foo").unwrap();
        let pem = csr_with_name(Some(DnValue::PrintableString(value)));
        assert_eq!(parse(pem.as_bytes()).unwrap().as_str(), "foo");
    }

    #[test]
    fn normalizes_bmp_common_name_to_text() {
        let value = BmpString::try_from("bmp.example.com").unwrap();
        let pem = csr_with_name(Some(DnValue::BmpString(value)));
        assert_eq!(parse(pem.as_bytes()).unwrap().as_str(), "bmp.example.com");
    }

    #[test]
    fn normalizes_universal_common_name_to_text() {
        let pem = csr_with_name(Some(DnValue::UniversalString(
            UniversalString::try_from("example.com").unwrap(),
        )));
        assert_eq!(parse(pem.as_bytes()).unwrap().as_str(), "example.com");
    }

    #[test]
    fn missing_common_name_is_rejected() {
        let pem = csr_with_name(None);
        assert!(matches!(
            parse(pem.as_bytes()),
            Err(CsrError::MissingCommonName)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse(b"this is not a csr"),
            Err(CsrError::Malformed(_))
        ));
    }

    #[test]
    fn certificate_pem_is_not_a_csr() {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["example.com".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        assert!(matches!(
            parse(cert.pem().as_bytes()),
            Err(CsrError::Malformed(_))
        ));
    }

    #[test]
    fn decodes_utf16_bytes() {
        let bytes: Vec<u8> = "héllo"
            .encode_utf16()
            .flat_map(|unit| unit.to_be_bytes())
            .collect();
        assert_eq!(decode_utf16(&bytes).unwrap(), "héllo");
    }

    #[test]
    fn decodes_utf32_bytes() {
        let bytes: Vec<u8> = "héllo"
            .chars()
            .flat_map(|c| (c as u32).to_be_bytes())
            .collect();
        assert_eq!(decode_utf32(&bytes).unwrap(), "héllo");
        assert!(decode_utf32(&[0, 0, 0]).is_err());
        assert!(decode_utf32(&[0, 0x11, 0, 0]).is_err());
    }

    #[test]
    fn artifact_name_follows_lego_sanitizing() {
        assert_eq!(
            Subject("*.example.com".to_string()).artifact_file_name().unwrap(),
            "_.example.com"
        );
        assert_eq!(
            Subject("testé.fr".to_string()).artifact_file_name().unwrap(),
            "xn--test-epa.fr"
        );
        assert_eq!(
            Subject("foo".to_string()).artifact_file_name().unwrap(),
            "foo"
        );
        assert_eq!(
            Subject("[::1]".to_string()).artifact_file_name().unwrap(),
            "[--1]"
        );
    }

    #[test]
    fn artifact_name_keeps_case() {
        assert_eq!(
            Subject("Example.COM".to_string()).artifact_file_name().unwrap(),
            "Example.COM"
        );
        assert_eq!(
            Subject("*.Sub.Example.com".to_string())
                .artifact_file_name()
                .unwrap(),
            "_.Sub.Example.com"
        );
    }
}
