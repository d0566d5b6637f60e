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

//! gnss_archive - uniform access to remote and local product archives.
//!
//! An [`Archive`] is a capability set {list, fetch, store, exists} over a
//! scheme-tagged URI, with variants for local directories, FTP, HTTP(S) (plain and
//! token-authenticated) and S3. Shared state (name, priority, station sets,
//! listing cache, download budget) lives in [`ArchiveCore`] by composition; each
//! variant only adds its transport state. [`resolve`] implements the prioritized
//! multi-source resolver on top of this.

pub mod errors;
pub mod compress;
pub mod resolve;

mod file;
mod http;
mod ftp;
mod s3;

pub use file::FileArchive;
pub use http::{HttpArchive,TokenHttpArchive};
pub use ftp::FtpArchive;
pub use s3::S3Archive;

use std::collections::HashMap;
use std::path::{Path,PathBuf};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use log::{debug,info,warn};
use regex::Regex;
use serde::{Serialize,Deserialize};
use tempfile::NamedTempFile;

use gnss_common::datetime::{deserialize_duration,serialize_duration};
use gnss_config::Credentials;
use gnss_products::{ProductCatalog,ProductType};
use crate::errors::{GnssArchiveError,Result,config_error,transport_error};

//--- archive URIs

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum ArchiveScheme {
    File,
    Ftp,
    Http,
    Https,
    S3
}

/// parsed form of `scheme://[user[:pass]@]host[:port]/path`
#[derive(Debug,Clone)]
pub struct ArchiveUri {
    pub scheme: ArchiveScheme,
    pub host: String,
    pub port: Option<u16>,
    pub base_path: String,
    pub username: Option<String>,
    pub password: Option<String>
}

impl ArchiveUri {
    pub fn parse (uri: &str) -> Result<ArchiveUri> {
        let (scheme_str, rest) = uri.split_once("://")
            .ok_or_else(|| config_error( format!("no scheme in archive uri '{}'", uri)))?;

        let scheme = match scheme_str.to_ascii_lowercase().as_str() {
            "file" => ArchiveScheme::File,
            "ftp" => ArchiveScheme::Ftp,
            "http" => ArchiveScheme::Http,
            "https" => ArchiveScheme::Https,
            "s3" => ArchiveScheme::S3,
            other => return Err( config_error( format!("unsupported archive scheme '{}'", other)))
        };

        let (userinfo, hostpart) = match rest.split_once('@') {
            Some((u,h)) => (Some(u), h),
            None => (None, rest)
        };
        let (username, password) = match userinfo {
            Some(u) => match u.split_once(':') {
                Some((name,pass)) => (Some(name.to_string()), Some(pass.to_string())),
                None => (Some(u.to_string()), None)
            },
            None => (None, None)
        };

        let (authority, base_path) = match hostpart.split_once('/') {
            Some((a,p)) => (a, p.trim_end_matches('/').to_string()),
            None => (hostpart, String::new())
        };
        let (host, port) = match authority.split_once(':') {
            Some((h,p)) => {
                let port: u16 = p.parse().map_err(|_| config_error( format!("bad port in '{}'", uri)))?;
                (h.to_string(), Some(port))
            }
            None => (authority.to_string(), None)
        };

        // file URIs have no authority - the whole remainder is the path
        let (host, base_path) = if scheme == ArchiveScheme::File {
            (String::new(), format!("/{}", hostpart.trim_start_matches('/').trim_end_matches('/')))
        } else {
            (host, base_path)
        };

        Ok( ArchiveUri { scheme, host, port, base_path, username, password })
    }
}

/// join URI/archive path segments, tolerating empty segments
pub fn join_path (base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

//--- archive configuration

fn default_stations () -> Vec<String> { vec!["*".to_string()] }
fn default_max_downloads () -> u32 { 250 }
fn default_timeout () -> StdDuration { StdDuration::from_secs(120) }

/// one datacenter definition, as configured
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct ArchiveConfig {
    pub name: String,
    pub uri: String,
    pub priority: u32,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub credentials_file: Option<String>,

    /// station codes this archive holds; "*" matches any
    #[serde(default = "default_stations")]
    pub stations: Vec<String>,

    #[serde(default)]
    pub excluded_stations: Vec<String>,

    /// product selectors ("ORB" or "ORB/FINAL") this archive carries; empty means all
    #[serde(default)]
    pub datatypes: Vec<String>,

    /// archive-local product overrides (layout/compression may differ per datacenter)
    #[serde(default)]
    pub overrides: Vec<ProductType>,

    /// connection is cycled after this many fetches (0 = unlimited)
    #[serde(default = "default_max_downloads")]
    pub max_downloads_per_connection: u32,

    #[serde(default)]
    pub readonly: bool,

    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub timeout: StdDuration,

    /// declared compression of files at this archive, overriding suffix inference
    #[serde(default)]
    pub compression: Option<String>,

    /// credential-for-cookie exchange endpoint (token-authenticated https archives)
    #[serde(default)]
    pub auth_url: Option<String>
}

/// validated runtime form of an archive definition
#[derive(Debug,Clone)]
pub struct ArchiveInfo {
    pub name: String,
    pub uri: ArchiveUri,
    pub priority: u32,
    pub credentials: Option<Credentials>,
    pub stations: Vec<String>,
    pub excluded_stations: Vec<String>,
    pub datatypes: Vec<String>,
    pub overrides: Vec<ProductType>,
    pub max_downloads: u32,
    pub readonly: bool,
    pub timeout: StdDuration,
    pub compression: Option<String>,
    pub auth_url: Option<String>
}

impl ArchiveInfo {
    pub fn from_config (cfg: &ArchiveConfig, catalog: &ProductCatalog) -> Result<ArchiveInfo> {
        let mut uri = ArchiveUri::parse(&cfg.uri)?;

        let credentials = match &cfg.credentials {
            Some(c) => Some(c.clone()),
            None => match &cfg.credentials_file {
                Some(f) => {
                    let path = gnss_config::expand_env_refs(f).map_err(|e| config_error(e))?;
                    Some( Credentials::from_file(&path).map_err(|e| config_error(e))?)
                }
                None => match (uri.username.take(), uri.password.take()) {
                    (Some(username), Some(password)) => Some( Credentials { username, password }),
                    _ => match Credentials::from_env(&cfg.name) {
                        Some(cred) => Some(cred),
                        None => match std::env::var(gnss_config::ENV_CREDENTIALS) {
                            Ok(path) => Some( Credentials::from_file(&path).map_err(|e| config_error(e))?),
                            Err(_) => None
                        }
                    }
                }
            }
        };

        for ov in &cfg.overrides {
            catalog.check_override(ov)?;
        }

        if !cfg.readonly && !cfg.datatypes.is_empty() {
            return Err( config_error( format!("writable archive '{}' must support all default types", cfg.name)));
        }

        Ok( ArchiveInfo {
            name: cfg.name.clone(),
            uri,
            priority: cfg.priority,
            credentials,
            stations: cfg.stations.clone(),
            excluded_stations: cfg.excluded_stations.clone(),
            datatypes: cfg.datatypes.clone(),
            overrides: cfg.overrides.clone(),
            max_downloads: cfg.max_downloads_per_connection,
            readonly: cfg.readonly,
            timeout: cfg.timeout,
            compression: cfg.compression.clone(),
            auth_url: cfg.auth_url.clone()
        })
    }

    /// is the station explicitly listed (not via wildcard)
    pub fn lists_station (&self, station: &str) -> bool {
        self.stations.iter().any( |s| s != "*" && s.eq_ignore_ascii_case(station))
    }

    pub fn has_station_wildcard (&self) -> bool {
        self.stations.iter().any( |s| s == "*")
    }

    pub fn excludes_station (&self, station: &str) -> bool {
        self.excluded_stations.iter().any( |s| s.eq_ignore_ascii_case(station))
    }

    /// does this archive carry the given product variant
    pub fn carries (&self, pt: &ProductType) -> bool {
        if self.datatypes.is_empty() {
            return true;
        }
        self.datatypes.iter().any( |sel| {
            match sel.split_once('/') {
                Some((t,s)) => t.eq_ignore_ascii_case(&pt.type_code) && s.eq_ignore_ascii_case(&pt.subtype),
                None => sel.eq_ignore_ascii_case(&pt.type_code)
            }
        })
    }

    /// the archive-local definition of a product variant (override if one exists)
    pub fn product_for<'a> (&'a self, pt: &'a ProductType) -> &'a ProductType {
        self.overrides.iter()
            .find( |ov| ov.type_code == pt.type_code && ov.subtype == pt.subtype)
            .unwrap_or(pt)
    }
}

/// shared per-archive state: configuration, connection flag, listing cache and
/// the download budget of the current connection
#[derive(Debug)]
pub struct ArchiveCore {
    pub info: ArchiveInfo,
    pub connected: bool,
    listings: HashMap<String,Vec<String>>,
    downloads: u32
}

impl ArchiveCore {
    pub fn new (info: ArchiveInfo) -> ArchiveCore {
        ArchiveCore { info, connected: false, listings: HashMap::new(), downloads: 0 }
    }

    fn reset_connection_state (&mut self) {
        self.connected = false;
        self.listings.clear();
        self.downloads = 0;
    }
}

//--- the archive capability

/// the uniform capability of a product source or sink. Variants implement the
/// raw transport operations; clients go through the module level wrappers below,
/// which add the listing cache, wildcard resolution, per-connection download
/// budget and per-operation timeout.
#[async_trait]
pub trait Archive: Send {
    fn core (&self) -> &ArchiveCore;
    fn core_mut (&mut self) -> &mut ArchiveCore;

    async fn connect (&mut self) -> Result<()>;
    async fn disconnect (&mut self);

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>>;
    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()>;
    async fn raw_store (&mut self, local: &Path, path: &str, filename: &str) -> Result<()>;
    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool>;
}

pub fn archive_name (arc: &dyn Archive) -> &str {
    &arc.core().info.name
}

pub async fn ensure_connected (arc: &mut dyn Archive) -> Result<()> {
    if !arc.core().connected {
        arc.connect().await?;
        arc.core_mut().connected = true;
    }
    Ok(())
}

pub async fn reconnect (arc: &mut dyn Archive) -> Result<()> {
    arc.disconnect().await;
    arc.core_mut().reset_connection_state();
    ensure_connected(arc).await
}

async fn timed<T> (timeout: StdDuration, what: &str, fut: impl std::future::Future<Output=Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err( transport_error( format!("{} timed out after {:?}", what, timeout)))
    }
}

/// directory listing, cached per path for the lifetime of the connection
pub async fn list_path (arc: &mut dyn Archive, path: &str) -> Result<Vec<String>> {
    ensure_connected(arc).await?;

    if let Some(cached) = arc.core().listings.get(path) {
        return Ok(cached.clone());
    }

    let timeout = arc.core().info.timeout;
    let names = timed(timeout, "list", arc.raw_list(path)).await?;
    arc.core_mut().listings.insert( path.to_string(), names.clone());
    Ok(names)
}

/// compile a `*`/`?` filename pattern into an anchored regex
pub fn wildcard_regex (pattern: &str) -> Result<Regex> {
    let mut p = String::from("^");
    for c in pattern.chars() {
        match c {
            '?' => p.push('.'),
            '*' => p.push_str(".*"),
            _ => p.push_str( &regex::escape(&c.to_string()))
        }
    }
    p.push('$');
    Regex::new(&p).map_err(|e| config_error( format!("bad wildcard pattern '{}': {}", pattern, e)))
}

/// resolve a possibly wildcarded filename against the archive's listing.
/// Exactly one match is required; zero is NotFound, several are Ambiguous.
pub async fn resolve_filename (arc: &mut dyn Archive, path: &str, filename: &str) -> Result<String> {
    if !gnss_products::template::has_wildcards(filename) {
        return Ok(filename.to_string());
    }

    let re = wildcard_regex(filename)?;
    let names = list_path(arc, path).await?;
    let mut matches: Vec<&String> = names.iter().filter( |n| re.is_match(n)).collect();

    match matches.len() {
        0 => Err( GnssArchiveError::NotFound( format!("{}/{} at {}", path, filename, archive_name(arc)))),
        1 => Ok(matches.remove(0).clone()),
        n => Err( GnssArchiveError::Ambiguous( format!("{}/{} at {} ({} matches)", path, filename, archive_name(arc), n)))
    }
}

/// download one concretely named file into tmp_dir. Applies the per-connection
/// download budget and makes one reconnect attempt on a retryable failure.
/// The returned temp file is owned by the caller.
pub async fn fetch_file (arc: &mut dyn Archive, path: &str, filename: &str, tmp_dir: &Path) -> Result<PathBuf> {
    if gnss_products::template::has_wildcards(filename) {
        return Err( config_error( format!("fetch needs a concrete filename, got '{}'", filename)));
    }

    ensure_connected(arc).await?;

    let core = arc.core();
    if core.info.max_downloads > 0 && core.downloads >= core.info.max_downloads {
        debug!("{}: download budget of {} exhausted, cycling connection", core.info.name, core.info.max_downloads);
        reconnect(arc).await?;
    }

    let tmp = NamedTempFile::new_in(tmp_dir)?;
    let (_f, local) = tmp.keep()
        .map_err(|e| GnssArchiveError::IOError(e.error))?;

    let timeout = arc.core().info.timeout;
    let mut result = timed(timeout, "fetch", arc.raw_fetch(path, filename, &local)).await;

    let retry_on_fresh_connection = match &result {
        Err(e) => e.is_retryable() && !matches!(e, GnssArchiveError::NotFound(_) | GnssArchiveError::Ambiguous(_)),
        Ok(()) => false
    };
    if retry_on_fresh_connection {
        warn!("{}: fetch {}/{} failed, reconnecting for one more attempt", archive_name(arc), path, filename);
        reconnect(arc).await?;
        result = timed(timeout, "fetch", arc.raw_fetch(path, filename, &local)).await;
    }

    match result {
        Ok(()) => {
            arc.core_mut().downloads += 1;
            Ok(local)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&local); // no temp files left behind
            Err(e)
        }
    }
}

pub async fn store_file (arc: &mut dyn Archive, local: &Path, path: &str, filename: &str) -> Result<()> {
    if arc.core().info.readonly {
        return Err( config_error( format!("archive '{}' is readonly", archive_name(arc))));
    }
    ensure_connected(arc).await?;
    let timeout = arc.core().info.timeout;
    timed(timeout, "store", arc.raw_store(local, path, filename)).await
}

pub async fn exists_file (arc: &mut dyn Archive, path: &str, filename: &str) -> Result<bool> {
    ensure_connected(arc).await?;

    if gnss_products::template::has_wildcards(filename) {
        return match resolve_filename(arc, path, filename).await {
            Ok(_) => Ok(true),
            Err(GnssArchiveError::NotFound(_)) => Ok(false),
            Err(e) => Err(e)
        };
    }

    let timeout = arc.core().info.timeout;
    timed(timeout, "exists", arc.raw_exists(path, filename)).await
}

//--- construction

/// build the archive variant matching the URI scheme of a datacenter definition
pub fn create_archive (cfg: &ArchiveConfig, catalog: &ProductCatalog) -> Result<Box<dyn Archive>> {
    let info = ArchiveInfo::from_config(cfg, catalog)?;

    let arc: Box<dyn Archive> = match info.uri.scheme {
        ArchiveScheme::File => Box::new( FileArchive::new(info)),
        ArchiveScheme::Ftp => Box::new( FtpArchive::new(info)),
        ArchiveScheme::Http => Box::new( HttpArchive::new(info)?),
        ArchiveScheme::Https => {
            if info.auth_url.is_some() {
                Box::new( TokenHttpArchive::new(info)?)
            } else {
                Box::new( HttpArchive::new(info)?)
            }
        }
        ArchiveScheme::S3 => Box::new( S3Archive::new(info)?)
    };
    Ok(arc)
}
