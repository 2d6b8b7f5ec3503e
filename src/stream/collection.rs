//! Collection listing and record decryption

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::api::CastBackend;
use crate::cancel::CancelToken;
use crate::crypto;
use crate::models::{
    DecryptedFileRecord, EncryptedFileRecord, EncryptedMagicMetadata, FileMetadata, MagicMetadata,
};

/// Fetch the full collection through the paginated diff.
///
/// Later versions of a record replace earlier ones and tombstones drop it, so
/// every file appears at most once in the result.
pub async fn fetch_collection_files(
    backend: &dyn CastBackend,
    cast_token: &str,
    cancel: &CancelToken,
) -> Result<Vec<EncryptedFileRecord>> {
    let mut since_time: i64 = 0;
    let mut files: HashMap<u64, EncryptedFileRecord> = HashMap::new();
    let mut pages = 0u32;

    loop {
        let page = cancel
            .run(backend.fetch_diff(cast_token, since_time))
            .await?
            .with_context(|| format!("Failed to fetch collection diff since {}", since_time))?;
        pages += 1;

        let previous = since_time;
        for record in page.diff {
            since_time = since_time.max(record.updation_time);
            if record.is_deleted {
                files.remove(&record.id);
            } else {
                files.insert(record.id, record);
            }
        }

        if !page.has_more {
            break;
        }
        if since_time <= previous {
            warn!(since_time, "diff reported more pages without advancing, stopping");
            break;
        }
    }

    debug!(pages, files = files.len(), "fetched collection listing");
    Ok(files.into_values().collect())
}

/// Decrypt a record's key, metadata and magic metadata.
///
/// Edited name and time from magic metadata take precedence; public magic
/// metadata wins over private.
pub fn decrypt_file_record(
    record: &EncryptedFileRecord,
    collection_key: &[u8],
) -> Result<DecryptedFileRecord> {
    let encrypted_key = crypto::from_b64(&record.encrypted_key)?;
    let nonce = crypto::from_b64(&record.key_decryption_nonce)?;
    let file_key = crypto::open_secretbox(&encrypted_key, &nonce, collection_key)
        .with_context(|| format!("Failed to decrypt key of file {}", record.id))?;

    let blob = record
        .metadata
        .as_ref()
        .ok_or_else(|| anyhow!("File {} has no metadata", record.id))?;
    let plaintext = crypto::decrypt_blob(
        &crypto::from_b64(&blob.encrypted_data)?,
        &crypto::from_b64(&blob.decryption_header)?,
        &file_key,
    )
    .with_context(|| format!("Failed to decrypt metadata of file {}", record.id))?;
    let mut metadata: FileMetadata = serde_json::from_slice(&plaintext)
        .with_context(|| format!("Invalid metadata for file {}", record.id))?;

    for magic in [&record.magic_metadata, &record.pub_magic_metadata]
        .into_iter()
        .flatten()
    {
        apply_overrides(&mut metadata, &decrypt_magic(magic, &file_key)?);
    }

    let file_header = record
        .file
        .as_ref()
        .map(|f| f.decryption_header.clone())
        .ok_or_else(|| anyhow!("File {} has no content header", record.id))?;

    Ok(DecryptedFileRecord {
        id: record.id,
        file_key,
        metadata,
        size: record.info.as_ref().and_then(|i| i.file_size),
        file_header,
    })
}

fn decrypt_magic(magic: &EncryptedMagicMetadata, file_key: &[u8]) -> Result<MagicMetadata> {
    let plaintext = crypto::decrypt_blob(
        &crypto::from_b64(&magic.data)?,
        &crypto::from_b64(&magic.header)?,
        file_key,
    )
    .context("Failed to decrypt magic metadata")?;
    serde_json::from_slice(&plaintext).context("Invalid magic metadata")
}

fn apply_overrides(metadata: &mut FileMetadata, magic: &MagicMetadata) {
    if let Some(name) = magic.edited_name.as_ref().filter(|n| !n.is_empty()) {
        metadata.title = name.clone();
    }
    if let Some(time) = magic.edited_time {
        metadata.creation_time = time;
    }
}
