//! Band-keyed inverted index over posting fingerprints.
//!
//! Each indexed posting owns two TTL'd records (fingerprint, location) and a
//! membership in one bucket per band key:
//!
//! > `band:1:4567 -> {"job_001", "job_042"}`
//!
//! Buckets carry no TTL. When records expire naturally their ids linger in
//! buckets until maintenance reconciles them, so readers must treat a
//! bucket member without a fingerprint record as absent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ExistenceCheck, Fingerprint, LocationInfo, LocationType, parse_bit_string, parse_hash,
};
use crate::storage::{Command, KeyedStore, Keys};

const FIELD_HASH: &str = "hash";
const FIELD_BITS: &str = "bits";
const FIELD_BANDS: &str = "bands";
const FIELD_INDEXED_AT: &str = "indexedAt";
const FIELD_TYPE: &str = "type";
const FIELD_LAT: &str = "lat";
const FIELD_LNG: &str = "lng";

/// Stored state of one indexed posting.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    pub fingerprint: Fingerprint,
    pub location: LocationInfo,
}

/// Fingerprint index on top of a [`KeyedStore`].
#[derive(Clone)]
pub struct FingerprintIndex {
    store: Arc<dyn KeyedStore>,
    keys: Keys,
    job_ttl: Duration,
}

impl FingerprintIndex {
    pub fn new(store: Arc<dyn KeyedStore>, keys: Keys, job_ttl: Duration) -> Self {
        Self {
            store,
            keys,
            job_ttl,
        }
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Union of every bucket the given band keys point at, in store order,
    /// minus `exclude`. One pipelined round-trip.
    pub async fn find_candidates(&self, bands: &[String], exclude: &str) -> Result<Vec<String>> {
        let batch = bands
            .iter()
            .map(|band| Command::SMembers(self.keys.band(band)))
            .collect();
        let replies = self.store.exec(batch).await?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for reply in replies {
            for id in reply.into_members()? {
                if id != exclude && seen.insert(id.clone()) {
                    candidates.push(id);
                }
            }
        }
        Ok(candidates)
    }

    /// Write fingerprint and location records and join every band bucket.
    ///
    /// These are independent writes in one pipeline, not a transaction.
    pub async fn index_job(
        &self,
        id: &str,
        fingerprint: &Fingerprint,
        location: &LocationInfo,
    ) -> Result<()> {
        let fp_key = self.keys.fingerprint(id);
        let loc_key = self.keys.location(id);

        let mut batch = vec![
            Command::HSet {
                key: fp_key.clone(),
                fields: fingerprint_fields(fingerprint),
            },
            Command::Expire {
                key: fp_key,
                ttl: self.job_ttl,
            },
            Command::HSet {
                key: loc_key.clone(),
                fields: location_fields(location),
            },
            Command::Expire {
                key: loc_key,
                ttl: self.job_ttl,
            },
        ];
        batch.extend(fingerprint.bands.iter().map(|band| Command::SAdd {
            key: self.keys.band(band),
            member: id.to_string(),
        }));

        self.store.exec(batch).await?;
        log::debug!("Indexed {} ({})", id, fingerprint.hash);
        Ok(())
    }

    /// Stored fingerprint and location, or `None` when the fingerprint record
    /// is missing or unreadable.
    pub async fn get_job_data(&self, id: &str) -> Result<Option<JobData>> {
        let mut replies = self
            .store
            .exec(vec![
                Command::HGetAll(self.keys.fingerprint(id)),
                Command::HGetAll(self.keys.location(id)),
            ])
            .await?
            .into_iter();

        let fp_fields = match replies.next() {
            Some(reply) => reply.into_hash()?,
            None => return Ok(None),
        };
        let loc_fields = match replies.next() {
            Some(reply) => reply.into_hash()?,
            None => HashMap::new(),
        };

        let Some(fingerprint) = parse_fingerprint(&fp_fields) else {
            return Ok(None);
        };
        Ok(Some(JobData {
            fingerprint,
            location: parse_location(&loc_fields),
        }))
    }

    /// Leave every band bucket, then drop both records. Returns whether a
    /// fingerprint record existed. Safe on ids that were never indexed.
    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        let fp_key = self.keys.fingerprint(id);
        let fields = self.store.hgetall(&fp_key).await?;

        let mut batch: Vec<Command> = fields
            .get(FIELD_BANDS)
            .map(|bands| split_bands(bands))
            .unwrap_or_default()
            .into_iter()
            .map(|band| Command::SRem {
                key: self.keys.band(&band),
                member: id.to_string(),
            })
            .collect();
        batch.push(Command::Del(fp_key));
        batch.push(Command::Del(self.keys.location(id)));

        self.store.exec(batch).await?;
        Ok(!fields.is_empty())
    }

    /// Which ids have a live fingerprint record. One pipelined round-trip.
    pub async fn check_existing_jobs(&self, ids: &[String]) -> Result<ExistenceCheck> {
        let batch = ids
            .iter()
            .map(|id| Command::Exists(self.keys.fingerprint(id)))
            .collect();
        let replies = self.store.exec(batch).await?;

        let mut check = ExistenceCheck::default();
        for (id, reply) in ids.iter().zip(replies) {
            if reply.into_bool()? {
                check.existing.push(id.clone());
            } else {
                check.new.push(id.clone());
            }
        }
        Ok(check)
    }
}

fn fingerprint_fields(fp: &Fingerprint) -> Vec<(String, String)> {
    vec![
        (FIELD_HASH.into(), fp.hash.clone()),
        (FIELD_BITS.into(), fp.bit_string()),
        (FIELD_BANDS.into(), fp.bands.join(",")),
        (
            FIELD_INDEXED_AT.into(),
            fp.indexed_at.timestamp_millis().to_string(),
        ),
    ]
}

fn location_fields(location: &LocationInfo) -> Vec<(String, String)> {
    let mut fields = vec![(FIELD_TYPE.into(), location.kind.to_string())];
    if let Some(coords) = location.coordinates() {
        fields.push((FIELD_LAT.into(), coords.lat.to_string()));
        fields.push((FIELD_LNG.into(), coords.lng.to_string()));
    }
    fields
}

fn split_bands(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|band| !band.is_empty())
        .map(String::from)
        .collect()
}

fn parse_fingerprint(fields: &HashMap<String, String>) -> Option<Fingerprint> {
    let hash = fields.get(FIELD_HASH)?;
    let bits = match fields.get(FIELD_BITS) {
        Some(bits) => parse_bit_string(bits)?,
        None => parse_hash(hash)?,
    };
    let indexed_at = fields
        .get(FIELD_INDEXED_AT)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Some(Fingerprint {
        hash: hash.clone(),
        bits,
        bands: fields
            .get(FIELD_BANDS)
            .map(|b| split_bands(b))
            .unwrap_or_default(),
        indexed_at,
    })
}

/// Missing or unreadable location records compare as unknown.
fn parse_location(fields: &HashMap<String, String>) -> LocationInfo {
    let kind = fields
        .get(FIELD_TYPE)
        .and_then(|t| t.parse::<LocationType>().ok())
        .unwrap_or(LocationType::Unknown);
    let coord = |field: &str| fields.get(field).and_then(|v| v.parse::<f64>().ok());

    match (kind, coord(FIELD_LAT), coord(FIELD_LNG)) {
        (LocationType::Physical, Some(lat), Some(lng)) => LocationInfo {
            lat: Some(lat),
            lng: Some(lng),
            kind,
        },
        (LocationType::Physical, _, _) => LocationInfo::unresolved(),
        (LocationType::Remote, _, _) => LocationInfo::remote(),
        (LocationType::Unknown, _, _) => LocationInfo::unknown(),
    }
}
