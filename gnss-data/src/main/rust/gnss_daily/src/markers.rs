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

/// per-date marker files. Presence carries the state, contents are diagnostics
/// only. Multiple scheduler processes on shared storage coordinate exclusively
/// through these advisory files - there is no process level mutex.

use std::io;
use std::path::{Path,PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime,Duration,Utc};

use gnss_common::fs::{ensure_writable_dir,file_age,remove_file_if_exists,set_file_contents};

pub const COMPLETE_MARKER: &str = "processing.complete";
pub const FAIL_MARKER: &str = "processing.failed";
pub const LOCK_MARKER: &str = "processing.lock";
pub const SKIP_MARKER: &str = "processing.skip";

/// classification of a date before a worker may enter it
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum DateState {
    Skipped,
    Done,
    /// failed recently or outside the retry window - leave alone
    Held,
    Retry,
    /// another worker holds a fresh lock
    Busy,
    /// a worker died holding the lock - may be taken over
    Takeover,
    Enterable
}

impl DateState {
    pub fn may_enter (&self) -> bool {
        matches!(*self, DateState::Retry | DateState::Takeover | DateState::Enterable)
    }
}

/// retry/lock gate parameters, in (fractional) days
#[derive(Debug,Clone,Copy)]
pub struct MarkerGates {
    pub lock_expiry_days: f64,
    pub retry_interval_days: f64,
    /// 0 disables the age gate
    pub retry_max_age_days: u32
}

pub struct DayMarkers {
    dir: PathBuf
}

impl DayMarkers {
    pub fn new (target_dir: impl AsRef<Path>) -> DayMarkers {
        DayMarkers { dir: target_dir.as_ref().to_path_buf() }
    }

    pub fn marker_path (&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn present (&self, name: &str) -> bool {
        self.marker_path(name).is_file()
    }

    fn marker_age (&self, name: &str) -> io::Result<StdDuration> {
        file_age( self.marker_path(name))
    }

    /// the per-date state machine of the scheduler: skip > complete > fail-age
    /// gates > lock freshness > enterable. `lock_age` may be supplied from an
    /// object store head when markers are mirrored across machines
    pub fn classify (&self, date: &DateTime<Utc>, now: &DateTime<Utc>, gates: &MarkerGates,
                     lock_age: Option<StdDuration>) -> io::Result<DateState> {
        if self.present(SKIP_MARKER) {
            return Ok( DateState::Skipped);
        }
        if self.present(COMPLETE_MARKER) {
            return Ok( DateState::Done);
        }

        if self.present(FAIL_MARKER) {
            if gates.retry_max_age_days > 0 {
                let age_limit = Duration::days( gates.retry_max_age_days as i64);
                if *date + age_limit < *now {
                    return Ok( DateState::Held); // too old to retry
                }
            }
            let age = self.marker_age(FAIL_MARKER)?;
            if (age.as_secs_f64() / 86400.0) < gates.retry_interval_days {
                return Ok( DateState::Held); // failed too recently
            }
            return Ok( DateState::Retry);
        }

        if self.present(LOCK_MARKER) {
            let age = match lock_age {
                Some(age) => age,
                None => self.marker_age(LOCK_MARKER)?
            };
            if (age.as_secs_f64() / 86400.0) > gates.lock_expiry_days {
                return Ok( DateState::Takeover);
            }
            return Ok( DateState::Busy);
        }

        Ok( DateState::Enterable)
    }

    pub fn write_lock (&self, now: &DateTime<Utc>) -> io::Result<()> {
        ensure_writable_dir(&self.dir)?;
        let contents = format!("pid {} time {}\n", std::process::id(), now.to_rfc3339());
        set_file_contents( self.marker_path(LOCK_MARKER), contents.as_bytes())
    }

    pub fn release_lock (&self) -> io::Result<()> {
        remove_file_if_exists( self.marker_path(LOCK_MARKER)).map(|_| ())
    }

    pub fn write_complete (&self, message: &str) -> io::Result<()> {
        ensure_writable_dir(&self.dir)?;
        remove_file_if_exists( self.marker_path(FAIL_MARKER))?;
        set_file_contents( self.marker_path(COMPLETE_MARKER), message.as_bytes())
    }

    pub fn write_fail (&self, message: &str) -> io::Result<()> {
        ensure_writable_dir(&self.dir)?;
        set_file_contents( self.marker_path(FAIL_MARKER), message.as_bytes())
    }

    pub fn remove_fail (&self) -> io::Result<bool> {
        remove_file_if_exists( self.marker_path(FAIL_MARKER))
    }

    pub fn write_skip (&self, message: &str) -> io::Result<()> {
        ensure_writable_dir(&self.dir)?;
        set_file_contents( self.marker_path(SKIP_MARKER), message.as_bytes())
    }
}
