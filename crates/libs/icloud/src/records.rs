use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use common_types::{Album, AlbumKind, Asset, AssetVariant, Fingerprint, RemoteError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const RECORD_TYPE_MASTER: &str = "CPLMaster";
pub const RECORD_TYPE_ALBUM: &str = "CPLAlbum";
pub const RECORD_TYPE_RELATION: &str = "CPLContainerRelation";

/// Album record types as the service encodes them.
const ALBUM_TYPE_ALBUM: u64 = 0;
const ALBUM_TYPE_FOLDER: u64 = 3;
/// Recently-deleted container; never materialized locally.
const ALBUM_TYPE_DELETED: u64 = 240;

/// One page of a record-zone query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub records: Vec<RecordEnvelope>,
    pub continuation_marker: Option<String>,
}

/// Raw record as returned by the record-zone query endpoint. Typed
/// extraction into [`Asset`] and [`Album`] happens below; anything that
/// fails extraction is a malformed record and aborts the fetch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    pub record_name: String,
    pub record_type: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    pub modified: Option<RecordTimestamp>,
}

#[derive(Debug, Deserialize)]
pub struct FieldValue {
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct RecordTimestamp {
    pub timestamp: i64,
}

/// Membership edge between an asset record and an album.
#[derive(Debug, Clone)]
pub struct ContainerRelation {
    pub asset_record: String,
    pub album_id: String,
}

fn malformed(record: &RecordEnvelope, reason: impl Into<String>) -> RemoteError {
    RemoteError::MalformedRecord {
        record_name: record.record_name.clone(),
        reason: reason.into(),
    }
}

fn string_field<'a>(record: &'a RecordEnvelope, name: &str) -> Result<&'a str, RemoteError> {
    record
        .fields
        .get(name)
        .and_then(|field| field.value.as_str())
        .ok_or_else(|| malformed(record, format!("missing string field {name}")))
}

fn flag_field(record: &RecordEnvelope, name: &str) -> bool {
    record
        .fields
        .get(name)
        .and_then(|field| field.value.as_u64())
        .is_some_and(|value| value == 1)
}

fn decoded_name(record: &RecordEnvelope, field: &str) -> Result<String, RemoteError> {
    let encoded = string_field(record, field)?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| malformed(record, format!("{field} is not base64")))?;
    String::from_utf8(bytes).map_err(|_| malformed(record, format!("{field} is not UTF-8")))
}

/// Extract the original asset, and the edited one when present, from a
/// master record.
pub fn assets_from_master(record: &RecordEnvelope) -> Result<Vec<Asset>, RemoteError> {
    if record.record_type != RECORD_TYPE_MASTER {
        return Err(malformed(record, "not a master record"));
    }
    let original_filename = decoded_name(record, "filenameEnc")?;
    let favorite = flag_field(record, "isFavorite");
    let modified = record
        .modified
        .as_ref()
        .and_then(|stamp| DateTime::<Utc>::from_timestamp_millis(stamp.timestamp));

    let mut assets = vec![resource_asset(
        record,
        "resOriginalRes",
        AssetVariant::Original,
        &original_filename,
        favorite,
        modified,
    )?];
    if record.fields.contains_key("resEditedRes") {
        assets.push(resource_asset(
            record,
            "resEditedRes",
            AssetVariant::Edited,
            &original_filename,
            favorite,
            modified,
        )?);
    }
    Ok(assets)
}

fn resource_asset(
    record: &RecordEnvelope,
    field: &str,
    variant: AssetVariant,
    original_filename: &str,
    favorite: bool,
    modified: Option<DateTime<Utc>>,
) -> Result<Asset, RemoteError> {
    let resource = &record
        .fields
        .get(field)
        .ok_or_else(|| malformed(record, format!("missing resource {field}")))?
        .value;
    let checksum = resource
        .get("fileChecksum")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(record, format!("{field} has no fileChecksum")))?;
    let fingerprint = Fingerprint::from_encoded(checksum)
        .map_err(|_| malformed(record, format!("{field} checksum is not base64")))?;
    let size = resource
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(record, format!("{field} has no size")))?;
    let download_url = resource
        .get("downloadURL")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let extension = original_filename
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_owned());

    Ok(Asset {
        fingerprint,
        extension,
        size,
        variant,
        favorite,
        record_name: Some(record.record_name.clone()),
        original_filename: Some(original_filename.to_owned()),
        modified,
        download_url,
    })
}

/// Extract an album from an album record. Deleted containers and unknown
/// container types yield `None`.
pub fn album_from_record(record: &RecordEnvelope) -> Result<Option<Album>, RemoteError> {
    if record.record_type != RECORD_TYPE_ALBUM {
        return Err(malformed(record, "not an album record"));
    }
    if flag_field(record, "isDeleted") {
        return Ok(None);
    }
    let album_type = record
        .fields
        .get("albumType")
        .and_then(|field| field.value.as_u64())
        .ok_or_else(|| malformed(record, "missing albumType"))?;
    let kind = match album_type {
        ALBUM_TYPE_ALBUM => AlbumKind::Album,
        ALBUM_TYPE_FOLDER => AlbumKind::Folder,
        ALBUM_TYPE_DELETED => return Ok(None),
        other => {
            tracing::warn!(
                "Skipping album record {} with unknown type {other}",
                record.record_name
            );
            return Ok(None);
        }
    };
    let name = decoded_name(record, "albumNameEnc")?;
    let parent = record
        .fields
        .get("parentId")
        .and_then(|field| field.value.as_str())
        .filter(|parent| !parent.is_empty())
        .map(str::to_owned);

    Ok(Some(Album::new(
        record.record_name.clone(),
        name,
        parent,
        kind,
    )))
}

pub fn relation_from_record(record: &RecordEnvelope) -> Result<ContainerRelation, RemoteError> {
    if record.record_type != RECORD_TYPE_RELATION {
        return Err(malformed(record, "not a container relation"));
    }
    Ok(ContainerRelation {
        asset_record: string_field(record, "itemId")?.to_owned(),
        album_id: string_field(record, "containerId")?.to_owned(),
    })
}
