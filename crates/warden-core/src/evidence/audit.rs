//! Audit pack assembly.
//!
//! A pack is a single portable ZIP holding the change spec, the provenance
//! graph, the raw event list, whatever aggregates exist at finalize time,
//! and a versions manifest. Assembly stages everything in a unique temp
//! directory that is removed when the builder is dropped, including on
//! failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::error::{Result, WardenError};
use crate::types::{ContentHash, Timestamp};

use super::{EventKind, EvidenceLog};

/// One file inside a pack, with its content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub name: String,
    pub hash: ContentHash,
    pub verified: bool,
}

/// Persisted description of a generated pack.
///
/// `signature` is reserved; nothing populates it yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPackRecord {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub created_at: Timestamp,
    pub items: Vec<EvidenceItem>,
    pub versions: BTreeMap<String, String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Optional aggregates included when available.
#[derive(Debug, Clone, Default)]
pub struct AuditExtras {
    pub diffs: Option<Value>,
    pub test_results: Option<Value>,
    pub mutation_report: Option<Value>,
    pub approvals: Option<Value>,
    pub finops: Option<Value>,
}

impl EvidenceLog {
    /// Assemble an audit pack for a mission. Returns the persisted record
    /// and the archive bytes for delivery.
    pub fn build_audit_pack(
        &self,
        mission_id: Uuid,
        changespec: &Value,
        extras: &AuditExtras,
    ) -> Result<(AuditPackRecord, Vec<u8>)> {
        let pack_id = Uuid::new_v4();
        let staging = tempfile::Builder::new().prefix("warden-audit-").tempdir()?;

        let provenance = self.provenance(mission_id);
        let events = self.mission_events(mission_id);

        let mut versions = BTreeMap::new();
        versions.insert("warden-core".to_string(), crate::VERSION.to_string());

        let mut entries: Vec<(String, String)> = vec![
            ("changespec.json".to_string(), serde_json::to_string_pretty(changespec)?),
            (
                "provenance.json".to_string(),
                serde_json::to_string_pretty(&provenance)?,
            ),
            ("events.json".to_string(), serde_json::to_string_pretty(&events)?),
            (
                "manifest.json".to_string(),
                serde_json::to_string_pretty(&json!({
                    "packId": pack_id,
                    "missionId": mission_id,
                    "versions": versions,
                    "signature": Value::Null,
                }))?,
            ),
        ];
        let optional = [
            ("diffs.json", &extras.diffs),
            ("test_results.json", &extras.test_results),
            ("mutation_report.json", &extras.mutation_report),
            ("approvals.json", &extras.approvals),
            ("finops.json", &extras.finops),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                entries.push((name.to_string(), serde_json::to_string_pretty(value)?));
            }
        }

        // Stage to disk first so a failed write surfaces before any archive
        // bytes exist, then zip from the staged copies.
        let mut items = Vec::with_capacity(entries.len());
        for (name, content) in &entries {
            std::fs::write(staging.path().join(name), content)?;
            items.push(EvidenceItem {
                name: name.clone(),
                hash: ContentHash::of(content),
                verified: true,
            });
        }

        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));
        for (name, _) in &entries {
            let content = std::fs::read(staging.path().join(name))?;
            archive.start_file(name, options)?;
            archive.write_all(&content)?;
        }
        let bytes = archive.finish()?.into_inner();

        let record = AuditPackRecord {
            id: pack_id,
            mission_id,
            created_at: crate::types::now(),
            items,
            versions,
            signature: None,
        };

        if let Some(store) = self.store_path() {
            let path = store.join(format!("pack_{pack_id}.json"));
            std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
        }
        self.packs.lock().insert(pack_id, record.clone());

        self.append(
            EventKind::AuditPackGenerated,
            Some(mission_id),
            json!({ "packId": pack_id, "items": record.items.len() }),
        );

        Ok((record, bytes))
    }

    pub fn get_pack(&self, id: Uuid) -> Option<AuditPackRecord> {
        if let Some(record) = self.packs.lock().get(&id).cloned() {
            return Some(record);
        }
        let store = self.store_path()?;
        let path = store.join(format!("pack_{id}.json"));
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Every evidence item must carry `verified = true`. Cryptographic
    /// verification is reserved for when packs are signed.
    pub fn verify_audit_pack(&self, id: Uuid) -> Result<bool> {
        let record = self
            .get_pack(id)
            .ok_or_else(|| WardenError::CheckpointNotFound(format!("audit pack {id}")))?;
        Ok(!record.items.is_empty() && record.items.iter().all(|item| item.verified))
    }
}
