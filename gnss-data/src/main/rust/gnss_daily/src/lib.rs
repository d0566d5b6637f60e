#![allow(unused)]
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

//! gnss_daily - the daily-batch scheduler.
//!
//! For each date of a configured range the scheduler attempts a user supplied
//! processing callback exactly once successfully. Multiple independent scheduler
//! processes coordinate through on-disk marker files (complete/failed/lock/skip)
//! with lock expiry and takeover; an optional object store mirrors the markers
//! so workers on different machines can share a range. Callback failures become
//! fail markers, never errors of the run.

pub mod errors;
pub mod order;
pub mod subst;
pub mod markers;
mod mirror;

pub use mirror::StoreMirror;

use std::collections::HashMap;
use std::path::{Path,PathBuf};
use std::time::{Duration as StdDuration,Instant};

use chrono::{DateTime,Datelike,Utc};
use log::{debug,info,warn};
use serde::{Serialize,Deserialize};

use gnss_common::datetime::{day_of_year,deserialize_opt_duration,parse_gnss_date,serialize_opt_duration};
use gnss_common::fs::{ensure_writable_dir,remove_file_if_exists,set_file_contents};
use crate::errors::{GnssDailyError,Result,config_error};
use crate::markers::{DateState,DayMarkers,MarkerGates,COMPLETE_MARKER,FAIL_MARKER,LOCK_MARKER};
use crate::order::ProcessingOrder;
use crate::subst::{expand,expand_for_list,parse_for_spec,VarContext};

fn default_increment () -> usize { 1 }
fn default_lock_expiry () -> f64 { 0.9 }

/// scheduler configuration, loaded from a RON file
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct DailyConfig {
    pub base_dir: String,

    /// per-date working directory template, e.g. "${base_dir}/${yyyy}/${ddd}"
    pub target_dir: String,

    /// first date of the range ("yyyy-mm-dd", "yyyy/ddd" or "wwww/d")
    pub start_date: String,

    /// last date of the range (inclusive)
    pub end_date: String,

    #[serde(default)]
    pub processing_order: ProcessingOrder,

    #[serde(default = "default_increment")]
    pub date_increment: usize,

    /// user variables for ${...} substitution in target_dir and prerequisites
    #[serde(default)]
    pub variables: HashMap<String,String>,

    /// relative paths that must all exist before a date is processed:
    /// "~/x" is target-dir relative, otherwise base-dir (or object store) relative
    #[serde(default)]
    pub prerequisites: Vec<String>,

    #[serde(default = "default_lock_expiry")]
    pub lock_expiry_days: f64,

    /// a failed date is only retried once its fail marker is at least this old
    #[serde(default)]
    pub retry_interval_days: f64,

    /// dates more than this many days in the past are not retried (0 = no age gate)
    #[serde(default)]
    pub retry_max_age_days: u32,

    #[serde(default, deserialize_with = "deserialize_opt_duration", serialize_with = "serialize_opt_duration")]
    pub max_runtime: Option<StdDuration>,

    /// stop after this many processing attempts, successful or failing (0 = unlimited)
    #[serde(default)]
    pub max_days_processed_per_run: u32,

    /// checked non-blockingly at the start of every date
    #[serde(default)]
    pub stop_file: Option<String>,

    #[serde(default)]
    pub max_consecutive_fails: u32,

    #[serde(default)]
    pub max_consecutive_prerequisite_fails: u32,

    /// clean the target dir (markers excepted) before invoking the callback
    #[serde(default)]
    pub clean_on_start: bool,

    /// optional shared namespace ("s3://bucket/prefix") mirroring markers and scratch
    #[serde(default)]
    pub object_store: Option<String>
}

/// what one date's processing sees
#[derive(Debug)]
pub struct DayContext {
    pub date: DateTime<Utc>,
    pub base_dir: PathBuf,
    pub target_dir: PathBuf,
    pub vars: VarContext
}

#[derive(Debug,Default)]
pub struct RunReport {
    pub processed: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub stop_reason: Option<String>
}

enum DayOutcome {
    Completed,
    Failed(String),
    PrereqMissing(String)
}

pub struct DailyScheduler {
    cfg: DailyConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    mirror: Option<StoreMirror>
}

/// mirror key prefix of a date: "yyyy/ddd"
fn date_rel (date: &DateTime<Utc>) -> String {
    format!("{:04}/{:03}", date.year(), day_of_year(date))
}

impl DailyScheduler {
    pub fn new (cfg: DailyConfig) -> Result<DailyScheduler> {
        let start = parse_gnss_date(&cfg.start_date)
            .ok_or_else(|| GnssDailyError::DateError( cfg.start_date.clone()))?;
        let end = parse_gnss_date(&cfg.end_date)
            .ok_or_else(|| GnssDailyError::DateError( cfg.end_date.clone()))?;
        if end < start {
            return Err( config_error( format!("end date {} before start date {}", cfg.end_date, cfg.start_date)));
        }

        let mirror = match &cfg.object_store {
            Some(uri) => Some( StoreMirror::new(uri)?),
            None => None
        };

        ensure_writable_dir(&cfg.base_dir)?;
        Ok( DailyScheduler { cfg, start, end, mirror })
    }

    pub fn config (&self) -> &DailyConfig { &self.cfg }

    /// the concrete dates this run would visit, in visit order
    pub fn visit_dates (&self) -> Vec<DateTime<Utc>> {
        order::visit_dates(&self.start, &self.end, self.cfg.processing_order, self.cfg.date_increment)
    }

    pub fn stop_file_path (&self) -> Option<PathBuf> {
        self.cfg.stop_file.as_ref().map( |sf| {
            let p = Path::new(sf);
            if p.is_absolute() { p.to_path_buf() } else { Path::new(&self.cfg.base_dir).join(p) }
        })
    }

    /// touch the stop file so running workers stop at their next date boundary
    pub fn request_stop (&self) -> Result<()> {
        match self.stop_file_path() {
            Some(p) => {
                set_file_contents(&p, b"stop requested\n")?;
                Ok(())
            }
            None => Err( config_error("no stop_file configured"))
        }
    }

    pub fn clear_stop (&self) -> Result<()> {
        if let Some(p) = self.stop_file_path() {
            remove_file_if_exists(&p)?;
        }
        Ok(())
    }

    pub fn day_context (&self, date: &DateTime<Utc>) -> Result<DayContext> {
        let mut vars = self.cfg.variables.clone();
        vars.insert( "base_dir".to_string(), self.cfg.base_dir.clone());

        let ctx_vars = VarContext::new(*date, vars);
        let target_dir = PathBuf::from( expand(&self.cfg.target_dir, &ctx_vars)?);

        Ok( DayContext {
            date: *date,
            base_dir: PathBuf::from(&self.cfg.base_dir),
            target_dir,
            vars: ctx_vars
        })
    }

    fn gates (&self) -> MarkerGates {
        MarkerGates {
            lock_expiry_days: self.cfg.lock_expiry_days,
            retry_interval_days: self.cfg.retry_interval_days,
            retry_max_age_days: self.cfg.retry_max_age_days
        }
    }

    /// visit the configured range once. The callback is invoked per enterable
    /// date and its failures are recorded as fail markers, never propagated
    pub async fn run<F> (&self, callback: &mut F) -> Result<RunReport>
        where F: FnMut(&DayContext) -> anyhow::Result<()>
    {
        let run_start = Instant::now();
        let mut report = RunReport::default();
        let mut consecutive_fails = 0u32;
        let mut consecutive_prereq_fails = 0u32;
        let mut skip_prereq_checks = false;
        let mut this_run_fail_markers: Vec<(PathBuf,String)> = Vec::new();

        for date in self.visit_dates() {
            if let Some(max) = self.cfg.max_runtime {
                if run_start.elapsed() >= max {
                    report.stop_reason = Some("max runtime reached".to_string());
                    break;
                }
            }
            if self.cfg.max_days_processed_per_run > 0 && report.processed >= self.cfg.max_days_processed_per_run {
                report.stop_reason = Some("max days per run reached".to_string());
                break;
            }
            if let Some(sf) = self.stop_file_path() {
                if sf.is_file() {
                    report.stop_reason = Some( format!("stop file {:?} present", sf));
                    break;
                }
            }

            let now = Utc::now();
            let ctx = self.day_context(&date)?;
            let day = DayMarkers::new(&ctx.target_dir);
            let rel = date_rel(&date);

            let lock_age = match &self.mirror {
                Some(m) => m.age( &format!("{}/{}", rel, LOCK_MARKER)).await?,
                None => None
            };
            if let Some(m) = &self.mirror {
                m.sync_down(&rel, &ctx.target_dir).await?;
            }

            let state = day.classify(&date, &now, &self.gates(), lock_age)?;
            match state {
                DateState::Skipped => {
                    report.skipped += 1;
                    debug!("date={} outcome=skipped", date.format("%Y-%m-%d"));
                    continue;
                }
                DateState::Done | DateState::Held | DateState::Busy => {
                    debug!("date={} outcome={:?}", date.format("%Y-%m-%d"), state);
                    continue;
                }
                DateState::Takeover => {
                    warn!("date={} taking over expired lock", date.format("%Y-%m-%d"));
                }
                DateState::Retry | DateState::Enterable => {}
            }

            day.write_lock(&now)?;
            if let Some(m) = &self.mirror {
                m.put( &format!("{}/{}", rel, LOCK_MARKER), b"").await?;
            }

            let started = Instant::now();
            let outcome = self.process_date(&ctx, skip_prereq_checks, callback).await?;
            let duration = started.elapsed().as_secs_f64();

            match &outcome {
                DayOutcome::Completed => {
                    day.write_complete("")?;
                    if let Some(m) = &self.mirror {
                        m.put( &format!("{}/{}", rel, COMPLETE_MARKER), b"").await?;
                        m.delete( &format!("{}/{}", rel, FAIL_MARKER)).await?;
                    }
                    report.processed += 1;
                    report.completed += 1;
                    consecutive_fails = 0;
                    consecutive_prereq_fails = 0;
                    info!("date={} outcome=complete duration={:.1}s", date.format("%Y-%m-%d"), duration);
                }
                DayOutcome::Failed(msg) => {
                    day.write_fail(msg)?;
                    if let Some(m) = &self.mirror {
                        m.put( &format!("{}/{}", rel, FAIL_MARKER), msg.as_bytes()).await?;
                    }
                    this_run_fail_markers.push( (ctx.target_dir.clone(), rel.clone()));
                    report.processed += 1;
                    report.failed += 1;
                    consecutive_fails += 1;
                    info!("date={} outcome=failed duration={:.1}s message={}", date.format("%Y-%m-%d"), duration, msg);
                }
                DayOutcome::PrereqMissing(what) => {
                    consecutive_prereq_fails += 1;
                    info!("date={} outcome=prerequisite-missing message={}", date.format("%Y-%m-%d"), what);
                }
            }

            day.release_lock()?;
            if let Some(m) = &self.mirror {
                m.delete( &format!("{}/{}", rel, LOCK_MARKER)).await?;
                m.sync_up(&rel, &ctx.target_dir).await?;
            }

            if self.cfg.max_consecutive_fails > 0 && consecutive_fails >= self.cfg.max_consecutive_fails {
                // this run is systematically broken - unwind its fail markers so the
                // next invocation retries these dates
                for (dir,rel) in &this_run_fail_markers {
                    DayMarkers::new(dir).remove_fail()?;
                    if let Some(m) = &self.mirror {
                        m.delete( &format!("{}/{}", rel, FAIL_MARKER)).await?;
                    }
                }
                report.stop_reason = Some("max consecutive fails reached".to_string());
                break;
            }
            if !skip_prereq_checks && self.cfg.max_consecutive_prerequisite_fails > 0
                && consecutive_prereq_fails >= self.cfg.max_consecutive_prerequisite_fails {
                skip_prereq_checks = true;
                warn!("{} consecutive prerequisite failures - no longer skipping on prerequisites", consecutive_prereq_fails);
            }
        }

        info!("run finished: {} processed ({} complete, {} failed), {} skipped{}",
              report.processed, report.completed, report.failed, report.skipped,
              report.stop_reason.as_ref().map( |r| format!(", stopped: {}", r)).unwrap_or_default());
        Ok(report)
    }

    async fn process_date<F> (&self, ctx: &DayContext, skip_prereq_checks: bool, callback: &mut F) -> Result<DayOutcome>
        where F: FnMut(&DayContext) -> anyhow::Result<()>
    {
        if self.cfg.clean_on_start {
            clean_scratch(&ctx.target_dir)?;
        }

        if !skip_prereq_checks {
            if let Some(missing) = self.check_prerequisites(ctx).await? {
                return Ok( DayOutcome::PrereqMissing(missing));
            }
        }

        match callback(ctx) {
            Ok(()) => Ok( DayOutcome::Completed),
            Err(e) => Ok( DayOutcome::Failed( format!("{:#}", e)))
        }
    }

    /// first missing prerequisite, None if all are present
    async fn check_prerequisites (&self, ctx: &DayContext) -> Result<Option<String>> {
        for prereq in &self.cfg.prerequisites {
            if let Some(spec) = parse_for_spec(prereq)? {
                let mut exists = |value: &str| self.local_prereq_exists(ctx, value);
                match expand_for_list(&spec, &ctx.vars, &mut exists) {
                    Ok(_) => {}
                    Err(GnssDailyError::SubstError(msg)) => return Ok( Some(msg)),
                    Err(e) => return Err(e)
                }
                continue;
            }

            let value = expand(prereq, &ctx.vars)?;
            if self.local_prereq_exists(ctx, &value) {
                continue;
            }
            if let Some(m) = &self.mirror {
                if m.exists(&value).await? {
                    continue;
                }
            }
            return Ok( Some(value));
        }
        Ok(None)
    }

    fn local_prereq_exists (&self, ctx: &DayContext, value: &str) -> bool {
        if let Some(rel) = value.strip_prefix("~/") {
            ctx.target_dir.join(rel).exists()
        } else {
            ctx.base_dir.join(value).exists()
        }
    }
}

/// clear the scratch contents of a date dir, preserving the marker files
fn clean_scratch (dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        for dir_entry in std::fs::read_dir(dir)? {
            let path = dir_entry?.path();
            let name = path.file_name().map( |n| n.to_string_lossy().to_string()).unwrap_or_default();
            if name.starts_with("processing.") {
                continue;
            }
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}
