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

//! gnss_cache - the queued persistent product cache.
//!
//! A [`Cache`] is a writable file archive plus the [`index::CacheIndex`]: requests
//! are deduplicated across jobs by their reqid, not-yet-published products stay
//! queued with a predicted availability, due requests are re-driven through the
//! resolver by [`Cache::fill_pending`], and retention expiry removes jobs and
//! unlinked files. [`Context`] wires catalog, compression registry, archive set
//! and cache together - built once in main, threaded through the core thereafter.

pub mod errors;
pub mod index;

use std::cmp::max;
use std::path::{Path,PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime,Duration,Utc};
use log::{debug,info,warn};
use serde::{Serialize,Deserialize};

use gnss_archive::compress::{CompressionRegistry,CompressionType,SuffixRule};
use gnss_archive::resolve::{fill_request as resolve_fill,predict_availability,FillOutcome};
use gnss_archive::{create_archive,fetch_file,store_file,Archive,ArchiveConfig};
use gnss_common::datetime::{deserialize_duration,serialize_duration};
use gnss_common::fs::ensure_writable_dir;
use gnss_config::{env_or,ENV_CACHE_DIR,ENV_TMP_DIR};
use gnss_products::request::{Request,RequestStatus};
use gnss_products::{ProductCatalog,ProductType};
use crate::errors::{GnssCacheError,Result,config_error};
use crate::index::{CacheIndex,StoredRequest};

const INDEX_FILENAME: &str = "cache.db";

fn default_queue_latency () -> StdDuration { StdDuration::from_secs(600) }
fn default_job_retention () -> u32 { 7 }

/// cache section of the acquisition configuration
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct CacheConfig {
    /// base directory of the cache archive (overridden by GNSS_CACHE_DIR)
    pub dir: String,

    /// scratch space for downloads and conversions (overridden by GNSS_TMP_DIR)
    #[serde(default)]
    pub tmp_dir: Option<String>,

    /// days a job (and the requests it owns) outlives its last availability date
    #[serde(default = "default_job_retention")]
    pub job_retention_days: u32,

    /// slack added to availability dates when suggesting the next queue check
    #[serde(default = "default_queue_latency", deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub queue_latency: StdDuration
}

/// the full acquisition configuration surface read by the core
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct AcquisitionConfig {
    pub compression_types: Vec<CompressionType>,
    pub compression_suffices: Vec<SuffixRule>,
    pub data_types: Vec<ProductType>,
    pub data_centers: Vec<ArchiveConfig>,
    pub cache: CacheConfig
}

/// what get_data should do besides reporting
#[derive(Debug,Clone,Copy)]
pub struct GetDataOpts {
    /// keep (or put) the request in the queue
    pub queue: bool,
    /// actively try to download now
    pub download: bool
}

/// composite result of a get_data call
#[derive(Debug)]
pub struct GetDataResult {
    pub request: Request,
    /// suggested next check for queued non-terminal requests
    pub next_check: Option<DateTime<Utc>>
}

/// writable file archive plus persistent index
pub struct Cache {
    base: Box<dyn Archive>,
    index: CacheIndex,
    tmp_dir: PathBuf,
    job_retention_days: u32,
    queue_latency: Duration
}

impl Cache {
    pub fn new (cfg: &CacheConfig, catalog: &ProductCatalog) -> Result<Cache> {
        let dir = env_or(ENV_CACHE_DIR, &cfg.dir);
        ensure_writable_dir(&dir)?;

        let tmp_dir = PathBuf::from( env_or(ENV_TMP_DIR, cfg.tmp_dir.as_deref().unwrap_or(&dir)));
        ensure_writable_dir(&tmp_dir)?;

        let base_cfg = ArchiveConfig {
            name: "cache".to_string(),
            uri: format!("file://{}", dir),
            priority: 0,
            credentials: None,
            credentials_file: None,
            stations: vec!["*".to_string()],
            excluded_stations: Vec::new(),
            datatypes: Vec::new(),
            overrides: Vec::new(),
            max_downloads_per_connection: 0,
            readonly: false,
            timeout: StdDuration::from_secs(60),
            compression: None,
            auth_url: None
        };
        let base = create_archive(&base_cfg, catalog).map_err(GnssCacheError::ArchiveError)?;

        let index = CacheIndex::open( Path::new(&dir).join(INDEX_FILENAME))?;

        Ok( Cache {
            base, index, tmp_dir,
            job_retention_days: cfg.job_retention_days,
            queue_latency: Duration::from_std(cfg.queue_latency).unwrap_or_else(|_| Duration::minutes(10))
        })
    }

    /// in-memory cache over a scratch directory (tests)
    pub fn ephemeral (dir: &Path, catalog: &ProductCatalog) -> Result<Cache> {
        let cfg = CacheConfig {
            dir: dir.to_string_lossy().to_string(),
            tmp_dir: None,
            job_retention_days: default_job_retention(),
            queue_latency: default_queue_latency()
        };
        Cache::new(&cfg, catalog)
    }

    pub fn tmp_dir (&self) -> &Path { &self.tmp_dir }

    /// queue a request: replace any previous request with the same reqid, predict
    /// its availability across all archives and set PENDING or UNAVAILABLE
    pub fn add_request (&mut self, req: &Request, catalog: &ProductCatalog,
                        archives: &[Box<dyn Archive>], now: &DateTime<Utc>) -> Result<Request> {
        let mut queued = req.clone();
        if let Err(e) = queued.validate(catalog) {
            queued.status = RequestStatus::Invalid;
            queued.message = Some( e.to_string());
            self.index.upsert_request(&queued, self.job_retention_days, now)?;
            return Ok(queued);
        }

        let predicted = predict_availability(catalog, archives, &queued, now);
        queued.status = predicted.status;
        queued.available_date = predicted.available_date;
        queued.message = predicted.message;

        self.index.upsert_request(&queued, self.job_retention_days, now)?;
        debug!("queued request {} as {}", queued.reqid(), queued.status);
        Ok(queued)
    }

    /// run the resolver for a request, persist the outcome and link any files
    pub async fn fill_request (&mut self, req: &mut Request, catalog: &ProductCatalog,
                               registry: &CompressionRegistry, archives: &mut [Box<dyn Archive>],
                               now: &DateTime<Utc>) -> Result<()> {
        let outcome = resolve_fill( catalog, registry, archives, req, self.base.as_mut(), &self.tmp_dir, now).await?;
        self.apply_outcome(req, outcome, catalog, now)
    }

    fn apply_outcome (&mut self, req: &mut Request, outcome: FillOutcome,
                      catalog: &ProductCatalog, now: &DateTime<Utc>) -> Result<()> {
        req.status = outcome.status;
        req.available_date = outcome.available_date;
        req.supplied_subtype = outcome.supplied_subtype.clone();
        req.message = outcome.message.clone();

        if let Some(stored) = self.index.get_request(&req.reqid())? {
            self.index.update_request(stored.id, req, self.job_retention_days, now)?;

            for spec in &outcome.files {
                let retention = catalog.lookup(&spec.type_code, &spec.subtype)
                    .map( |pt| pt.retention_days)
                    .unwrap_or(self.job_retention_days);
                let expiry = *now + Duration::days(retention as i64);

                let file_id = self.index.add_file(&spec.type_code, &spec.subtype, &spec.relative_path(), &expiry)?;
                self.index.link_file(stored.id, file_id)?;
            }
        }
        Ok(())
    }

    /// fill every due PENDING/DELAYED request (ascending availability) and report
    /// the jobs whose requests are now all terminal
    pub async fn fill_pending (&mut self, catalog: &ProductCatalog, registry: &CompressionRegistry,
                               archives: &mut [Box<dyn Archive>], now: &DateTime<Utc>) -> Result<Vec<String>> {
        let due = self.index.due_requests(now)?;
        let total = due.len();

        let mut filled = 0;
        let mut delayed = 0;
        let mut pending = 0;
        let mut unavailable = 0;

        for stored in due {
            let mut req = stored.req;
            self.fill_request(&mut req, catalog, registry, archives, now).await?;
            match req.status {
                RequestStatus::Completed => filled += 1,
                RequestStatus::Delayed => delayed += 1,
                RequestStatus::Pending => pending += 1,
                _ => unavailable += 1
            }
        }

        if total > 0 {
            info!("fill_pending: {} due, {} filled, {} delayed, {} pending, {} unavailable",
                  total, filled, delayed, pending, unavailable);
        }
        Ok( self.index.ready_jobs()?)
    }

    /// copy the cached files of a COMPLETED request into a target archive and drop
    /// the request; UNAVAILABLE requests are just dropped. Anything else is a no-op
    pub async fn retrieve_request (&mut self, target: &mut dyn Archive, req: &Request) -> Result<()> {
        let stored = match self.index.get_request(&req.reqid())? {
            Some(s) => s,
            None => return Ok(())
        };

        match stored.req.status {
            RequestStatus::Completed => {
                for file in self.index.files_of_request(stored.id)? {
                    let (path, filename) = split_relative_path(&file.relative_path);
                    let local = fetch_file( self.base.as_mut(), path, filename, &self.tmp_dir).await?;
                    let result = store_file( target, &local, path, filename).await;
                    let _ = std::fs::remove_file(&local);
                    result?;
                }
                self.index.delete_request(stored.id)?;
            }
            RequestStatus::Unavailable => {
                self.index.delete_request(stored.id)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// the composite client API: optionally queue, optionally download, optionally
    /// deliver into a target archive. An unqueued request is removed again after
    /// retrieval; queued non-terminal results carry a suggested next check time
    pub async fn get_data (&mut self, req: &Request, catalog: &ProductCatalog,
                           registry: &CompressionRegistry, archives: &mut [Box<dyn Archive>],
                           mut target: Option<&mut dyn Archive>, opts: GetDataOpts,
                           now: &DateTime<Utc>) -> Result<GetDataResult> {
        let previously_queued = self.index.get_request(&req.reqid())?.is_some();

        // a completed request is served from the cache, not re-resolved
        let mut current = match self.index.get_request(&req.reqid())? {
            Some(stored) if stored.req.status == RequestStatus::Completed => stored.req,
            _ => self.add_request(req, catalog, archives, now)?
        };

        if opts.download && !current.status.is_terminal() && current.status != RequestStatus::Invalid {
            self.fill_request(&mut current, catalog, registry, archives, now).await?;
        }

        if let Some(tgt) = target.as_deref_mut() {
            self.retrieve_request(tgt, &current).await?;
        }

        // only keep what the caller asked to queue
        if !opts.queue && !previously_queued {
            if let Some(stored) = self.index.get_request(&current.reqid())? {
                self.index.delete_request(stored.id)?;
            }
        }

        let next_check = if opts.queue && !current.status.is_terminal() {
            current.available_date.map( |d| d + self.queue_latency)
        } else {
            None
        };

        Ok( GetDataResult { request: current, next_check })
    }

    /// retention pass: expired jobs go first (cascading their requests), then
    /// expired files nothing links anymore, index row and disk file together
    pub fn purge (&mut self, now: &DateTime<Utc>) -> Result<()> {
        let jobs = self.index.purge_jobs(now)?;
        if jobs > 0 {
            info!("purged {} expired jobs", jobs);
        }

        for file in self.index.purgeable_files(now)? {
            let disk_path = self.cached_file_path(&file.relative_path);
            debug!("purging cached file {:?}", disk_path);
            self.index.purge_file(&file, &disk_path)?;
        }
        Ok(())
    }

    pub fn cached_file_path (&self, relative_path: &str) -> PathBuf {
        let base = &self.base.core().info.uri.base_path;
        Path::new(base).join(relative_path)
    }

    pub fn index (&self) -> &CacheIndex { &self.index }
}

fn split_relative_path (relative_path: &str) -> (&str,&str) {
    match relative_path.rsplit_once('/') {
        Some((path,filename)) => (path, filename),
        None => ("", relative_path)
    }
}

/// everything the request-fulfillment core needs, built once in main from the
/// acquisition config: immutable catalog and registry, the archive set and the
/// cache handle
pub struct Context {
    pub catalog: ProductCatalog,
    pub registry: CompressionRegistry,
    pub archives: Vec<Box<dyn Archive>>,
    pub cache: Cache
}

impl Context {
    pub fn from_config (cfg: &AcquisitionConfig) -> Result<Context> {
        let catalog = ProductCatalog::new( cfg.data_types.clone())?;
        if catalog.is_empty() {
            return Err( config_error("no data types configured"));
        }

        let registry = CompressionRegistry::new( cfg.compression_types.clone(), cfg.compression_suffices.clone())
            .map_err(GnssCacheError::ArchiveError)?;

        for pt in catalog.iter() {
            registry.pipeline(&pt.compression).map_err(|e| config_error(
                format!("{}/{}: {}", pt.type_code, pt.subtype, e)))?;
        }

        let mut archives = Vec::with_capacity( cfg.data_centers.len());
        for dc in &cfg.data_centers {
            archives.push( create_archive(dc, &catalog).map_err(GnssCacheError::ArchiveError)?);
        }

        let cache = Cache::new(&cfg.cache, &catalog)?;

        Ok( Context { catalog, registry, archives, cache })
    }

    pub fn archive_named (&self, name: &str) -> Option<usize> {
        self.archives.iter().position( |a| a.core().info.name == name)
    }

    /// restrict the archive set to a single named source
    pub fn restrict_to_archive (&mut self, name: &str) -> Result<()> {
        match self.archive_named(name) {
            Some(i) => {
                let arc = self.archives.swap_remove(i);
                self.archives = vec![arc];
                Ok(())
            }
            None => Err( config_error( format!("no archive named '{}'", name)))
        }
    }

    pub async fn get_data (&mut self, req: &Request, target: Option<&mut dyn Archive>,
                           opts: GetDataOpts, now: &DateTime<Utc>) -> Result<GetDataResult> {
        self.cache.get_data(req, &self.catalog, &self.registry, &mut self.archives, target, opts, now).await
    }

    pub async fn fill_pending (&mut self, now: &DateTime<Utc>) -> Result<Vec<String>> {
        self.cache.fill_pending(&self.catalog, &self.registry, &mut self.archives, now).await
    }

    pub fn purge (&mut self, now: &DateTime<Utc>) -> Result<()> {
        self.cache.purge(now)
    }
}
