/*
 * Copyright (c) 2024, United States Government, as represented by the
 * Administrator of the National Aeronautics and Space Administration.
 * All rights reserved.
 *
 * The RACE - Runtime for Airspace Concept Evaluation platform is licensed
 * under the Apache License, Version 2.0 (the "License"); you may not use
 * this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

/// the persistent cache index - a single-file embedded store holding known files,
/// jobs and their queued requests. Every multi-row mutation runs inside one
/// transaction; a failed transaction leaves the index unchanged.

use std::path::Path;

use chrono::{DateTime,TimeZone,Utc};
use log::warn;
use rusqlite::{params,Connection,OptionalExtension};

use gnss_products::request::{Request,RequestStatus};
use crate::errors::{GnssCacheError,Result};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    subtype TEXT NOT NULL,
    relative_path TEXT NOT NULL UNIQUE,
    expiry INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    created INTEGER NOT NULL,
    expiry INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reqid TEXT NOT NULL UNIQUE,
    job_id TEXT NOT NULL,
    type TEXT NOT NULL,
    subtype TEXT NOT NULL,
    start INTEGER NOT NULL,
    end INTEGER NOT NULL,
    station TEXT,
    status TEXT NOT NULL,
    message TEXT,
    available_date INTEGER,
    supplied_subtype TEXT
);
CREATE TABLE IF NOT EXISTS file_requests (
    request_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    PRIMARY KEY (request_id, file_id)
);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests (status, available_date);
";

#[derive(Debug,Clone)]
pub struct StoredRequest {
    pub id: i64,
    pub req: Request
}

#[derive(Debug,Clone)]
pub struct StoredFile {
    pub id: i64,
    pub type_code: String,
    pub subtype: String,
    pub relative_path: String,
    pub expiry: DateTime<Utc>
}

pub struct CacheIndex {
    conn: Connection
}

fn ts (dt: &DateTime<Utc>) -> i64 { dt.timestamp() }

fn dt (secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| Utc::now())
}

fn row_to_request (row: &rusqlite::Row) -> rusqlite::Result<StoredRequest> {
    let status: String = row.get(8)?;
    Ok( StoredRequest {
        id: row.get(0)?,
        req: Request {
            job_id: row.get(2)?,
            type_code: row.get(3)?,
            subtype: row.get(4)?,
            start: dt( row.get(5)?),
            end: dt( row.get(6)?),
            station: row.get(7)?,
            status: RequestStatus::from_str(&status).unwrap_or(RequestStatus::Invalid),
            message: row.get(9)?,
            available_date: row.get::<_,Option<i64>>(10)?.map(dt),
            supplied_subtype: row.get(11)?
        }
    })
}

const REQUEST_COLS: &str = "id, reqid, job_id, type, subtype, start, end, station, status, message, available_date, supplied_subtype";

impl CacheIndex {
    pub fn open (path: impl AsRef<Path>) -> Result<CacheIndex> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok( CacheIndex { conn })
    }

    pub fn open_in_memory () -> Result<CacheIndex> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok( CacheIndex { conn })
    }

    //--- requests and jobs

    /// insert or replace a request by its reqid, creating its job row on first
    /// contact and refreshing the job expiry. Returns the request row id
    pub fn upsert_request (&mut self, req: &Request, retention_days: u32, now: &DateTime<Utc>) -> Result<i64> {
        let tx = self.conn.transaction()?;

        tx.prepare_cached("INSERT OR IGNORE INTO jobs (id, created, expiry) VALUES (?, ?, ?)")?
            .execute( params![ req.job_id, ts(now), ts(now)])?;

        tx.prepare_cached(
            "INSERT INTO requests (reqid, job_id, type, subtype, start, end, station, status, message, available_date, supplied_subtype) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(reqid) DO UPDATE SET \
                status = excluded.status, message = excluded.message, \
                available_date = excluded.available_date, supplied_subtype = excluded.supplied_subtype")?
            .execute( params![
                req.reqid(), req.job_id, req.type_code, req.subtype,
                ts(&req.start), ts(&req.end), req.station,
                req.status.as_str(), req.message,
                req.available_date.as_ref().map(ts), req.supplied_subtype])?;

        let id: i64 = tx.prepare_cached("SELECT id FROM requests WHERE reqid = ?")?
            .query_row( params![ req.reqid()], |row| row.get(0))?;

        refresh_job_expiry(&tx, &req.job_id, retention_days, now)?;

        tx.commit()?;
        Ok(id)
    }

    pub fn get_request (&self, reqid: &str) -> Result<Option<StoredRequest>> {
        let sql = format!("SELECT {} FROM requests WHERE reqid = ?", REQUEST_COLS);
        let found = self.conn.prepare_cached(&sql)?
            .query_row( params![reqid], row_to_request)
            .optional()?;
        Ok(found)
    }

    pub fn update_request (&mut self, id: i64, req: &Request, retention_days: u32, now: &DateTime<Utc>) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.prepare_cached(
            "UPDATE requests SET status = ?, message = ?, available_date = ?, supplied_subtype = ? WHERE id = ?")?
            .execute( params![
                req.status.as_str(), req.message,
                req.available_date.as_ref().map(ts), req.supplied_subtype, id])?;

        refresh_job_expiry(&tx, &req.job_id, retention_days, now)?;

        tx.commit()?;
        Ok(())
    }

    /// PENDING/DELAYED requests due by now, ascending available_date
    pub fn due_requests (&self, now: &DateTime<Utc>) -> Result<Vec<StoredRequest>> {
        let sql = format!(
            "SELECT {} FROM requests \
             WHERE status IN ('PENDING','DELAYED') AND available_date IS NOT NULL AND available_date <= ? \
             ORDER BY available_date ASC", REQUEST_COLS);

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map( params![ ts(now)], row_to_request)?;
        let mut due = Vec::new();
        for row in rows { due.push(row?); }
        Ok(due)
    }

    /// delete a request and its file links (files stay until purge)
    pub fn delete_request (&mut self, id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.prepare_cached("DELETE FROM file_requests WHERE request_id = ?")?.execute(params![id])?;
        tx.prepare_cached("DELETE FROM requests WHERE id = ?")?.execute(params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// ids of jobs whose requests have all reached a terminal status
    pub fn ready_jobs (&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT j.id FROM jobs j WHERE NOT EXISTS ( \
                SELECT 1 FROM requests r WHERE r.job_id = j.id \
                AND r.status NOT IN ('COMPLETED','UNAVAILABLE')) \
             AND EXISTS (SELECT 1 FROM requests r2 WHERE r2.job_id = j.id)")?;

        let rows = stmt.query_map([], |row| row.get::<_,String>(0))?;
        let mut ids = Vec::new();
        for row in rows { ids.push(row?); }
        Ok(ids)
    }

    //--- files

    /// register a cached file (upsert by relative path); the expiry only moves out
    pub fn add_file (&mut self, type_code: &str, subtype: &str, relative_path: &str,
                     expiry: &DateTime<Utc>) -> Result<i64> {
        self.conn.prepare_cached(
            "INSERT INTO files (type, subtype, relative_path, expiry) VALUES (?, ?, ?, ?) \
             ON CONFLICT(relative_path) DO UPDATE SET expiry = MAX(expiry, excluded.expiry)")?
            .execute( params![ type_code, subtype, relative_path, ts(expiry)])?;

        let id: i64 = self.conn.prepare_cached("SELECT id FROM files WHERE relative_path = ?")?
            .query_row( params![relative_path], |row| row.get(0))?;
        Ok(id)
    }

    pub fn link_file (&mut self, request_id: i64, file_id: i64) -> Result<()> {
        self.conn.prepare_cached(
            "INSERT OR IGNORE INTO file_requests (request_id, file_id) VALUES (?, ?)")?
            .execute( params![request_id, file_id])?;
        Ok(())
    }

    pub fn files_of_request (&self, request_id: i64) -> Result<Vec<StoredFile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.id, f.type, f.subtype, f.relative_path, f.expiry \
             FROM files f JOIN file_requests fr ON fr.file_id = f.id \
             WHERE fr.request_id = ? ORDER BY f.relative_path")?;

        let rows = stmt.query_map( params![request_id], |row| Ok( StoredFile {
            id: row.get(0)?,
            type_code: row.get(1)?,
            subtype: row.get(2)?,
            relative_path: row.get(3)?,
            expiry: dt( row.get(4)?)
        }))?;

        let mut files = Vec::new();
        for row in rows { files.push(row?); }
        Ok(files)
    }

    //--- retention

    /// delete jobs past their expiry, cascading their requests and links.
    /// Returns the number of deleted jobs
    pub fn purge_jobs (&mut self, now: &DateTime<Utc>) -> Result<usize> {
        let tx = self.conn.transaction()?;

        let mut deleted = 0;
        {
            let mut job_stmt = tx.prepare_cached("SELECT id FROM jobs WHERE expiry <= ?")?;
            let job_ids: Vec<String> = job_stmt.query_map( params![ts(now)], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            for job_id in &job_ids {
                tx.prepare_cached(
                    "DELETE FROM file_requests WHERE request_id IN (SELECT id FROM requests WHERE job_id = ?)")?
                    .execute(params![job_id])?;
                tx.prepare_cached("DELETE FROM requests WHERE job_id = ?")?.execute(params![job_id])?;
                tx.prepare_cached("DELETE FROM jobs WHERE id = ?")?.execute(params![job_id])?;
                deleted += 1;
            }
        }

        tx.commit()?;
        Ok(deleted)
    }

    /// expired files with no live request links
    pub fn purgeable_files (&self, now: &DateTime<Utc>) -> Result<Vec<StoredFile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.id, f.type, f.subtype, f.relative_path, f.expiry FROM files f \
             WHERE f.expiry <= ? AND NOT EXISTS (SELECT 1 FROM file_requests fr WHERE fr.file_id = f.id)")?;

        let rows = stmt.query_map( params![ts(now)], |row| Ok( StoredFile {
            id: row.get(0)?,
            type_code: row.get(1)?,
            subtype: row.get(2)?,
            relative_path: row.get(3)?,
            expiry: dt( row.get(4)?)
        }))?;

        let mut files = Vec::new();
        for row in rows { files.push(row?); }
        Ok(files)
    }

    /// delete one file row and its on-disk copy in a single step: the row delete
    /// is rolled back if the disk remove fails
    pub fn purge_file (&mut self, file: &StoredFile, disk_path: &Path) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.prepare_cached("DELETE FROM files WHERE id = ?")?.execute( params![file.id])?;

        if disk_path.is_file() {
            if let Err(e) = std::fs::remove_file(disk_path) {
                warn!("cannot remove cached file {:?}: {}", disk_path, e);
                return Ok(()); // tx dropped -> rolled back, file stays indexed
            }
        }
        tx.commit()?;
        Ok(())
    }

    //--- introspection (mostly for tests and status reports)

    pub fn request_count (&self) -> Result<i64> {
        Ok( self.conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?)
    }

    pub fn file_count (&self) -> Result<i64> {
        Ok( self.conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?)
    }

    pub fn job_count (&self) -> Result<i64> {
        Ok( self.conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?)
    }
}

/// job expiry = max(available_date of its requests) + retention, floored at now
fn refresh_job_expiry (tx: &rusqlite::Transaction, job_id: &str, retention_days: u32,
                       now: &DateTime<Utc>) -> rusqlite::Result<()> {
    let max_avail: Option<i64> = tx.prepare_cached(
        "SELECT MAX(available_date) FROM requests WHERE job_id = ?")?
        .query_row( params![job_id], |row| row.get(0))?;

    let retention_secs = retention_days as i64 * 86400;
    let expiry = std::cmp::max( max_avail.unwrap_or(0) + retention_secs, ts(now));

    tx.prepare_cached("UPDATE jobs SET expiry = ? WHERE id = ?")?
        .execute( params![expiry, job_id])?;
    Ok(())
}
