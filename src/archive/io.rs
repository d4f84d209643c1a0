//! Writing and reading artifact files

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::crypto::{self, encryption::ALGORITHM, DerivedKey};
use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, BackupKind, CompressionLevel};

use super::compression::{compress, decompress};
use super::format::{
    ArtifactHeader, EncryptionInfo, Manifest, PayloadBody, FORMAT_VERSION, MAGIC, MAX_HEADER_LEN,
};

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Builds one artifact file
pub struct ArtifactWriter {
    header: ArtifactHeader,
}

impl ArtifactWriter {
    pub fn new(
        artifact_id: ArtifactId,
        kind: BackupKind,
        base_artifact_id: Option<ArtifactId>,
        compression: CompressionLevel,
        manifest: Manifest,
    ) -> Self {
        Self {
            header: ArtifactHeader {
                format_version: FORMAT_VERSION,
                artifact_id,
                kind,
                base_artifact_id,
                created_at: Utc::now(),
                compression,
                encryption: None,
                payload_len: 0,
                payload_sha256: String::new(),
                manifest,
            },
        }
    }

    /// Encode `body` and write the complete file to `path`
    ///
    /// The file is flushed and synced before returning; moving it into place
    /// is the caller's job.
    pub fn write(
        mut self,
        path: &Path,
        body: &PayloadBody,
        key: Option<&DerivedKey>,
    ) -> VaultResult<ArtifactHeader> {
        let plain = serde_json::to_vec(body)?;
        let packed = compress(&plain, self.header.compression)?;

        let payload = match key {
            Some(key) => {
                let sealed = crypto::encrypt(&packed, key)?;
                self.header.encryption = Some(EncryptionInfo {
                    algorithm: ALGORITHM.to_string(),
                    nonce: sealed.nonce_b64(),
                    key_fingerprint: key.fingerprint(),
                });
                sealed.ciphertext
            }
            None => packed,
        };

        self.header.payload_len = payload.len() as u64;
        self.header.payload_sha256 = sha256_hex(&payload);

        let header_bytes = serde_json::to_vec(&self.header)?;
        let header_len = u32::try_from(header_bytes.len())
            .ok()
            .filter(|len| *len <= MAX_HEADER_LEN)
            .ok_or_else(|| VaultError::Validation("Artifact manifest is too large".into()))?;

        let file = File::create(path)
            .map_err(|e| VaultError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&[FORMAT_VERSION])?;
        writer.write_all(&header_len.to_le_bytes())?;
        writer.write_all(&header_bytes)?;
        writer.write_all(&payload)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        Ok(self.header)
    }
}

/// Reads an artifact file; opening parses the header only
#[derive(Debug)]
pub struct ArtifactReader {
    path: PathBuf,
    header: ArtifactHeader,
    payload_offset: u64,
}

impl ArtifactReader {
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let file = File::open(&path)
            .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let mut preamble = [0u8; 9];
        reader.read_exact(&mut preamble).map_err(|_| {
            VaultError::Integrity(format!("{} is truncated", path.display()))
        })?;
        if &preamble[..4] != MAGIC {
            return Err(VaultError::Integrity(format!(
                "{} is not a Rollcall artifact",
                path.display()
            )));
        }
        if preamble[4] != FORMAT_VERSION {
            return Err(VaultError::Integrity(format!(
                "Unsupported artifact format version {}",
                preamble[4]
            )));
        }
        let header_len = u32::from_le_bytes([preamble[5], preamble[6], preamble[7], preamble[8]]);
        if header_len > MAX_HEADER_LEN {
            return Err(VaultError::Integrity(format!(
                "Artifact header length {} is implausible",
                header_len
            )));
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        reader.read_exact(&mut header_bytes).map_err(|_| {
            VaultError::Integrity(format!("{} header is truncated", path.display()))
        })?;
        let header: ArtifactHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VaultError::Integrity(format!("Corrupt artifact header: {}", e)))?;

        Ok(Self {
            path,
            header,
            payload_offset: 9 + u64::from(header_len),
        })
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn into_header(self) -> ArtifactHeader {
        self.header
    }

    pub fn manifest(&self) -> &Manifest {
        &self.header.manifest
    }

    fn stored_payload(&self) -> VaultResult<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.payload_offset))?;
        let mut payload = Vec::with_capacity(self.header.payload_len as usize);
        file.read_to_end(&mut payload)?;

        if payload.len() as u64 != self.header.payload_len {
            return Err(VaultError::Integrity(format!(
                "Payload length mismatch: expected {}, found {}",
                self.header.payload_len,
                payload.len()
            )));
        }
        if sha256_hex(&payload) != self.header.payload_sha256 {
            return Err(VaultError::Integrity(
                "Payload checksum does not match the manifest".into(),
            ));
        }
        Ok(payload)
    }

    /// Check the stored payload against its checksum without decoding it
    pub fn verify(&self) -> VaultResult<()> {
        self.stored_payload().map(|_| ())
    }

    /// Verify, decrypt, decompress and parse the payload
    pub fn read_payload(&self, key: Option<&DerivedKey>) -> VaultResult<PayloadBody> {
        check_key(&self.header, key)?;
        let stored = self.stored_payload()?;

        let packed = match (&self.header.encryption, key) {
            (Some(info), Some(key)) => crypto::decrypt(&info.nonce, &stored, key)?,
            _ => stored,
        };
        let plain = decompress(&packed, self.header.compression)?;
        serde_json::from_slice(&plain)
            .map_err(|e| VaultError::Integrity(format!("Corrupt artifact payload: {}", e)))
    }
}

/// Whether `key` can open an artifact with this header
pub fn check_key(header: &ArtifactHeader, key: Option<&DerivedKey>) -> VaultResult<()> {
    match (&header.encryption, key) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(VaultError::Encryption(format!(
            "Artifact {} is encrypted and no key is available",
            header.artifact_id
        ))),
        (Some(info), Some(key)) if info.key_fingerprint != key.fingerprint() => {
            Err(VaultError::Encryption(format!(
                "Artifact {} was sealed with a different key",
                header.artifact_id
            )))
        }
        (Some(_), Some(_)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TableExport;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_body() -> PayloadBody {
        let mut files = BTreeMap::new();
        files.insert("records/roster.csv".to_string(), STANDARD.encode(b"id,name\n1,Ada\n"));
        PayloadBody {
            files,
            tables: vec![TableExport {
                table: "attendance".into(),
                rows: vec![json!({"id": 1})],
            }],
        }
    }

    fn writer(compression: CompressionLevel) -> ArtifactWriter {
        ArtifactWriter::new(
            ArtifactId::new(),
            BackupKind::Full,
            None,
            compression,
            Manifest {
                roots: vec![],
                files: vec![],
                inherited: vec![],
                removed: vec![],
                tables: BTreeMap::new(),
                captured_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_plain_artifact_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.rcva");
        let header = writer(CompressionLevel::High)
            .write(&path, &sample_body(), None)
            .unwrap();

        let reader = ArtifactReader::open(&path).unwrap();
        assert_eq!(reader.header(), &header);
        reader.verify().unwrap();
        assert_eq!(reader.read_payload(None).unwrap(), sample_body());
    }

    #[test]
    fn test_encrypted_artifact_needs_matching_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.rcva");
        let key = DerivedKey::from_bytes([9u8; 32]);
        writer(CompressionLevel::Medium)
            .write(&path, &sample_body(), Some(&key))
            .unwrap();

        let reader = ArtifactReader::open(&path).unwrap();
        assert!(reader.header().encryption.is_some());
        reader.verify().unwrap();

        assert!(matches!(reader.read_payload(None), Err(VaultError::Encryption(_))));
        let other = DerivedKey::from_bytes([1u8; 32]);
        assert!(matches!(
            reader.read_payload(Some(&other)),
            Err(VaultError::Encryption(_))
        ));
        assert_eq!(reader.read_payload(Some(&key)).unwrap(), sample_body());
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.rcva");
        writer(CompressionLevel::None)
            .write(&path, &sample_body(), None)
            .unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x55;
        std::fs::write(&path, bytes).unwrap();

        let reader = ArtifactReader::open(&path).unwrap();
        assert!(matches!(reader.verify(), Err(VaultError::Integrity(_))));
    }

    #[test]
    fn test_rejects_foreign_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.rcva");
        std::fs::write(&path, b"PK\x03\x04 definitely a zip").unwrap();
        assert!(matches!(
            ArtifactReader::open(&path),
            Err(VaultError::Integrity(_))
        ));
    }
}
