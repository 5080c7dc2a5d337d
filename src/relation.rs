//! Inbound certificate requests and outbound certificate responses.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// A requirer asked for a certificate over a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateCreationRequest {
    pub certificate_signing_request: String,
    pub relation_id: u64,
}

/// What the provider writes back for one CSR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateResponse {
    pub certificate: String,
    pub certificate_signing_request: String,
    pub ca: String,
    pub chain: Vec<String>,
    #[serde(skip)]
    pub relation_id: u64,
}

/// Outbound side of the certificates relation.
pub trait CertificatePublisher: Send + Sync {
    fn set_relation_certificate(&self, response: &CertificateResponse) -> Result<()>;
}

/// Relation data kept in memory, one list of responses per relation.
#[derive(Clone, Default)]
pub struct InMemoryRelation {
    inner: Arc<Mutex<HashMap<u64, Vec<CertificateResponse>>>>,
}

impl InMemoryRelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self, relation_id: u64) -> Result<Vec<CertificateResponse>> {
        let lock = self.inner.lock().map_err(|e| anyhow!(e.to_string()))?;
        Ok(lock.get(&relation_id).cloned().unwrap_or_default())
    }

    /// Serializes a relation's responses the way they would appear in the databag.
    pub fn to_json(&self, relation_id: u64) -> Result<String> {
        Ok(serde_json::to_string(&self.responses(relation_id)?)?)
    }
}

impl CertificatePublisher for InMemoryRelation {
    fn set_relation_certificate(&self, response: &CertificateResponse) -> Result<()> {
        let mut lock = self.inner.lock().map_err(|e| anyhow!(e.to_string()))?;
        let entries = lock.entry(response.relation_id).or_default();
        // A re-issued CSR replaces its previous response.
        entries.retain(|existing| {
            existing.certificate_signing_request != response.certificate_signing_request
        });
        entries.push(response.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(csr: &str, cert: &str) -> CertificateResponse {
        CertificateResponse {
            certificate: cert.to_string(),
            certificate_signing_request: csr.to_string(),
            ca: "ca".to_string(),
            chain: vec!["ca".to_string(), cert.to_string()],
            relation_id: 7,
        }
    }

    #[test]
    fn records_responses_per_relation() -> Result<()> {
        let relation = InMemoryRelation::new();
        relation.set_relation_certificate(&response("csr-a", "cert-a"))?;
        relation.set_relation_certificate(&response("csr-b", "cert-b"))?;

        assert_eq!(relation.responses(7)?.len(), 2);
        assert!(relation.responses(8)?.is_empty());
        Ok(())
    }

    #[test]
    fn reissued_csr_replaces_previous_response() -> Result<()> {
        let relation = InMemoryRelation::new();
        relation.set_relation_certificate(&response("csr-a", "old"))?;
        relation.set_relation_certificate(&response("csr-a", "new"))?;

        let responses = relation.responses(7)?;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].certificate, "new");
        Ok(())
    }

    #[test]
    fn databag_json_omits_relation_id() -> Result<()> {
        let relation = InMemoryRelation::new();
        relation.set_relation_certificate(&response("csr-a", "cert-a"))?;
        let json: serde_json::Value = serde_json::from_str(&relation.to_json(7)?)?;
        let entry = &json[0];
        assert_eq!(entry["certificate"], "cert-a");
        assert_eq!(entry["chain"][0], "ca");
        assert!(entry.get("relation_id").is_none());
        Ok(())
    }

    #[test]
    fn request_deserializes_from_event_payload() -> Result<()> {
        let request: CertificateCreationRequest = serde_json::from_str(
            r#"{"certificate_signing_request": "-----BEGIN CERTIFICATE REQUEST-----", "relation_id": 3}"#,
        )?;
        assert_eq!(request.relation_id, 3);
        Ok(())
    }
}
