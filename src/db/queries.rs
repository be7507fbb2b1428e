use super::models::{LibraryStats, TrackSummary};
use super::{Database, DbError, Result};
use crate::fingerprint::Couple;
use crate::index::{self, FingerprintIndex, IndexError, NewTrack, TrackRecord};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bound on `?` placeholders per lookup statement.
const MAX_LOOKUP_PARAMS: usize = 900;

const TRACK_COLUMNS: &str =
    "id, title, artist, external_ref, track_key, content_hash, duration_secs";

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        external_ref: row.get(3)?,
        key: row.get(4)?,
        content_hash: row.get(5)?,
        duration_secs: row.get(6)?,
    })
}

impl From<DbError> for IndexError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, msg))
                if matches!(
                    err.code,
                    rusqlite::ffi::ErrorCode::CannotOpen
                        | rusqlite::ffi::ErrorCode::DatabaseBusy
                        | rusqlite::ffi::ErrorCode::DatabaseLocked
                        | rusqlite::ffi::ErrorCode::SystemIoFailure
                ) =>
            {
                IndexError::Unavailable(msg.unwrap_or_else(|| err.to_string()))
            }
            DbError::Poisoned => IndexError::Unavailable("database connection lock poisoned".into()),
            other => IndexError::Storage(other.to_string()),
        }
    }
}

impl Database {
    /// Insert a track row. Returns the new id.
    pub fn insert_track(&self, t: &NewTrack) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tracks (title, artist, external_ref, track_key, content_hash, duration_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                t.title,
                t.artist,
                t.external_ref,
                t.key(),
                t.content_hash,
                t.duration_secs,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Store all fingerprints for one batch in a single transaction.
    pub fn insert_fingerprints(&self, fingerprints: &BTreeMap<u32, Couple>) -> Result<()> {
        if fingerprints.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO fingerprints (address, track_id, anchor_time_ms) VALUES (?1, ?2, ?3)",
            )?;
            for (address, c) in fingerprints {
                stmt.execute(params![address, c.track_id, c.anchor_time_ms])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reverse lookup of couples by address, chunked to stay under the
    /// parameter limit.
    pub fn lookup_couples(&self, addresses: &BTreeSet<u32>) -> Result<HashMap<u32, Vec<Couple>>> {
        let conn = self.conn()?;
        let addresses: Vec<u32> = addresses.iter().copied().collect();
        let mut out: HashMap<u32, Vec<Couple>> = HashMap::new();

        for chunk in addresses.chunks(MAX_LOOKUP_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT address, track_id, anchor_time_ms FROM fingerprints
                 WHERE address IN ({placeholders})
                 ORDER BY address, track_id, anchor_time_ms"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    Couple {
                        track_id: row.get(1)?,
                        anchor_time_ms: row.get(2)?,
                    },
                ))
            })?;
            for row in rows {
                let (address, couple) = row?;
                out.entry(address).or_default().push(couple);
            }
        }
        Ok(out)
    }

    /// Delete a track and its fingerprints. Returns whether a track row existed.
    pub fn remove_track(&self, track_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM fingerprints WHERE track_id = ?1", params![track_id])?;
        let removed = tx.execute("DELETE FROM tracks WHERE id = ?1", params![track_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn track_by_id(&self, track_id: i64) -> Result<Option<TrackRecord>> {
        let conn = self.conn()?;
        Self::query_track(&conn, "id = ?1", &track_id)
    }

    pub fn track_by_key(&self, key: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn()?;
        Self::query_track(&conn, "track_key = ?1", &key)
    }

    pub fn track_by_hash(&self, content_hash: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn()?;
        Self::query_track(&conn, "content_hash = ?1 ORDER BY id LIMIT 1", &content_hash)
    }

    fn query_track(
        conn: &Connection,
        condition: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<Option<TrackRecord>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE {condition}");
        Ok(conn.query_row(&sql, [value], track_from_row).optional()?)
    }

    /// All tracks with their fingerprint counts, oldest first.
    pub fn list_tracks(&self) -> Result<Vec<TrackSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.title, t.artist, t.external_ref, t.track_key, t.content_hash,
                    t.duration_secs, COUNT(f.address), t.created_at
             FROM tracks t
             LEFT JOIN fingerprints f ON f.track_id = t.id
             GROUP BY t.id
             ORDER BY t.id",
        )?;

        let tracks = stmt
            .query_map([], |row| {
                Ok(TrackSummary {
                    track: track_from_row(row)?,
                    fingerprints: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tracks)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let conn = self.conn()?;
        let total_tracks: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        let total_fingerprints: i64 =
            conn.query_row("SELECT COUNT(*) FROM fingerprints", [], |r| r.get(0))?;
        let distinct_addresses: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT address) FROM fingerprints",
            [],
            |r| r.get(0),
        )?;
        let tracks_with_hash: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE content_hash IS NOT NULL",
            [],
            |r| r.get(0),
        )?;

        Ok(LibraryStats {
            total_tracks,
            total_fingerprints,
            distinct_addresses,
            tracks_with_hash,
        })
    }

    /// Wipe every track and fingerprint. The id sequence is kept, so ids
    /// handed out before the wipe are still never reused.
    pub fn erase(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
             DELETE FROM fingerprints;
             DELETE FROM tracks;
             COMMIT;",
        )?;
        Ok(())
    }
}

impl FingerprintIndex for Database {
    fn store_fingerprints(&self, fingerprints: &BTreeMap<u32, Couple>) -> index::Result<()> {
        Ok(self.insert_fingerprints(fingerprints)?)
    }

    fn get_couples(&self, addresses: &BTreeSet<u32>) -> index::Result<HashMap<u32, Vec<Couple>>> {
        Ok(self.lookup_couples(addresses)?)
    }

    fn register_track(&self, track: &NewTrack) -> index::Result<i64> {
        match self.insert_track(track) {
            Ok(id) => {
                log::info!(
                    "Registered '{}' by '{}' with id {}",
                    track.title,
                    track.artist,
                    id
                );
                Ok(id)
            }
            Err(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ffi::ErrorCode::ConstraintViolation =>
            {
                Err(IndexError::Duplicate { key: track.key() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_track(&self, track_id: i64) -> index::Result<()> {
        if !self.remove_track(track_id)? {
            log::debug!("Delete of unknown track {}", track_id);
        }
        Ok(())
    }

    fn get_track(&self, track_id: i64) -> index::Result<Option<TrackRecord>> {
        Ok(self.track_by_id(track_id)?)
    }

    fn find_track_by_key(&self, key: &str) -> index::Result<Option<TrackRecord>> {
        Ok(self.track_by_key(key)?)
    }

    fn find_track_by_hash(&self, content_hash: &str) -> index::Result<Option<TrackRecord>> {
        Ok(self.track_by_hash(content_hash)?)
    }

    fn track_count(&self) -> index::Result<u64> {
        Ok(self.stats()?.total_tracks as u64)
    }
}
