use crate::records::{
    ContainerRelation, QueryResponse, RECORD_TYPE_ALBUM, RECORD_TYPE_MASTER, RECORD_TYPE_RELATION,
    RecordEnvelope, album_from_record, assets_from_master, relation_from_record,
};
use crate::session::AuthSession;
use common_types::{Asset, Fingerprint, FingerprintHasher, LibrarySnapshot, RemoteError, RemoteLibrary};
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const DATABASE_PATH: &str = "database/1/com.apple.photos.cloud/production/private";
const QUERY_PAGE_SIZE: u32 = 200;

/// Record-zone client of the photo service. Session state is only touched
/// between requests, never concurrently with one in flight, which the
/// mutex around the session enforces.
pub struct PhotosClient {
    http: Client,
    session: Mutex<AuthSession>,
    cancel: CancellationToken,
}

impl PhotosClient {
    /// Wrap an authenticated session. The session must have reached the
    /// ready state.
    pub fn new(session: AuthSession, cancel: CancellationToken) -> Self {
        Self {
            http: session.http(),
            session: Mutex::new(session),
            cancel,
        }
    }

    /// The current trust token, for the `token` front-end operation.
    pub async fn trust_token(&self) -> Option<String> {
        self.session.lock().await.trust_token().map(str::to_owned)
    }

    async fn service_endpoint(&self) -> Result<(String, Vec<String>), RemoteError> {
        let session = self.session.lock().await;
        let base = session
            .photos_url()
            .ok_or(RemoteError::SessionExpired)?
            .to_owned();
        Ok((base, session.zones().to_vec()))
    }

    async fn query_records(
        &self,
        base: &str,
        zone: &str,
        record_type: &str,
    ) -> Result<Vec<RecordEnvelope>, RemoteError> {
        let url = format!("{base}/{DATABASE_PATH}/records/query");
        let mut records = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut body = json!({
                "zoneID": { "zoneName": zone },
                "query": { "recordType": record_type },
                "resultsLimit": QUERY_PAGE_SIZE,
            });
            if let Some(marker) = &marker {
                body["continuationMarker"] = json!(marker);
            }
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let response = check_status(response).await?;
            let page: QueryResponse = response.json().await.map_err(transport)?;
            records.extend(page.records);
            match page.continuation_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl RemoteLibrary for PhotosClient {
    async fn fetch_all(&self) -> Result<LibrarySnapshot, RemoteError> {
        let (base, zones) = self.service_endpoint().await?;
        let mut snapshot = LibrarySnapshot::default();
        let mut record_assets: HashMap<String, Vec<Fingerprint>> = HashMap::new();
        let mut relations: Vec<ContainerRelation> = Vec::new();

        for zone in &zones {
            for record in self.query_records(&base, zone, RECORD_TYPE_ALBUM).await? {
                if let Some(album) = album_from_record(&record)? {
                    snapshot.insert_album(album);
                }
            }
            for record in self.query_records(&base, zone, RECORD_TYPE_MASTER).await? {
                let assets = assets_from_master(&record)?;
                record_assets.insert(
                    record.record_name.clone(),
                    assets.iter().map(|asset| asset.fingerprint.clone()).collect(),
                );
                for asset in assets {
                    snapshot.insert_asset(asset);
                }
            }
            for record in self.query_records(&base, zone, RECORD_TYPE_RELATION).await? {
                relations.push(relation_from_record(&record)?);
            }
        }

        for relation in relations {
            let Some(fingerprints) = record_assets.get(&relation.asset_record) else {
                warn!(
                    "Membership references unknown asset record {}",
                    relation.asset_record
                );
                continue;
            };
            let entries: Vec<(String, Fingerprint)> = fingerprints
                .iter()
                .filter_map(|fingerprint| {
                    snapshot
                        .assets
                        .get(fingerprint)
                        .map(|asset| (asset.link_name(), fingerprint.clone()))
                })
                .collect();
            let Some(album) = snapshot.albums.get_mut(&relation.album_id) else {
                warn!("Membership references unknown album {}", relation.album_id);
                continue;
            };
            for (link_name, fingerprint) in entries {
                album.members.insert(link_name, fingerprint);
            }
        }

        Ok(snapshot)
    }

    async fn download_asset(&self, asset: &Asset, dest: &Path) -> Result<(), RemoteError> {
        let record_name = asset
            .record_name
            .clone()
            .unwrap_or_else(|| asset.fingerprint.encoded());
        let url = asset
            .download_url
            .as_ref()
            .ok_or_else(|| RemoteError::MalformedRecord {
                record_name: record_name.clone(),
                reason: "missing download URL".into(),
            })?;

        let response = self.http.get(url).send().await.map_err(transport)?;
        let response = check_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await.map_err(io_transport)?;
        let mut hasher = FingerprintHasher::new();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            hasher.update(&chunk);
            received += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(io_transport)?;
        }
        file.flush().await.map_err(io_transport)?;

        if received != asset.size {
            return Err(RemoteError::Integrity {
                record_name,
                detail: format!("expected {} bytes, received {received}", asset.size),
            });
        }
        let fingerprint = hasher.finalize();
        if fingerprint != asset.fingerprint {
            return Err(RemoteError::Integrity {
                record_name,
                detail: "checksum of received bytes disagrees with the record".into(),
            });
        }
        Ok(())
    }

    async fn delete_assets(&self, record_names: &[String]) -> Result<(), RemoteError> {
        if record_names.is_empty() {
            return Ok(());
        }
        let (base, zones) = self.service_endpoint().await?;
        let zone = zones.first().ok_or(RemoteError::SessionExpired)?;
        let operations: Vec<_> = record_names
            .iter()
            .map(|record_name| {
                json!({
                    "operationType": "forceDelete",
                    "record": { "recordName": record_name },
                })
            })
            .collect();
        let response = self
            .http
            .post(format!("{base}/{DATABASE_PATH}/records/modify"))
            .json(&json!({
                "zoneID": { "zoneName": zone },
                "operations": operations,
                "atomic": false,
            }))
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn refresh_session(&self) -> Result<(), RemoteError> {
        let mut session = self.session.lock().await;
        session.refresh(&self.cancel).await?;
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> RemoteError {
    RemoteError::Transport(Box::new(error))
}

fn io_transport(error: std::io::Error) -> RemoteError {
    RemoteError::Transport(Box::new(error))
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 => Err(RemoteError::SessionExpired),
        429 => Err(RemoteError::RateLimited),
        status if status >= 500 => Err(RemoteError::Server { status }),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::UnexpectedStatus { status, body })
        }
    }
}
