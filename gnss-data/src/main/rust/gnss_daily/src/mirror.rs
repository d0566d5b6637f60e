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

/// optional object-store backing for the scheduler: markers and locks are
/// mirrored to a shared namespace so workers on different machines coordinate,
/// and the per-date target dir becomes a scratch area synchronized down before
/// and up after the callback.

use std::fs;
use std::path::Path;
use std::time::{Duration as StdDuration,SystemTime};

use futures::StreamExt;
use log::debug;
use object_store::{ObjectStore,PutPayload,path::Path as ObjectPath};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;

use gnss_common::fs::ensure_writable_dir;
use crate::errors::{GnssDailyError,Result,config_error};

pub struct StoreMirror {
    store: Box<dyn ObjectStore>,
    prefix: String
}

impl StoreMirror {
    /// `s3://bucket/prefix` or `file:///dir` (the latter mostly for tests)
    pub fn new (uri: &str) -> Result<StoreMirror> {
        let (scheme, rest) = uri.split_once("://")
            .ok_or_else(|| config_error( format!("no scheme in object store uri '{}'", uri)))?;

        match scheme {
            "s3" => {
                let (bucket, prefix) = match rest.split_once('/') {
                    Some((b,p)) => (b, p.trim_end_matches('/').to_string()),
                    None => (rest, String::new())
                };
                let store = AmazonS3Builder::from_env().with_bucket_name(bucket).build()?;
                Ok( StoreMirror { store: Box::new(store), prefix })
            }
            "file" => {
                let dir = format!("/{}", rest.trim_start_matches('/'));
                ensure_writable_dir(&dir)?;
                let store = LocalFileSystem::new_with_prefix(&dir)?;
                Ok( StoreMirror { store: Box::new(store), prefix: String::new() })
            }
            other => Err( config_error( format!("unsupported object store scheme '{}'", other)))
        }
    }

    fn key (&self, rel: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(rel)
        } else {
            ObjectPath::from( format!("{}/{}", self.prefix, rel))
        }
    }

    pub async fn exists (&self, rel: &str) -> Result<bool> {
        match self.store.head( &self.key(rel)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound {..}) => Ok(false),
            Err(e) => Err(e.into())
        }
    }

    /// age of a mirrored object, None if absent
    pub async fn age (&self, rel: &str) -> Result<Option<StdDuration>> {
        match self.store.head( &self.key(rel)).await {
            Ok(meta) => {
                let modified: SystemTime = meta.last_modified.into();
                Ok( SystemTime::now().duration_since(modified).ok())
            }
            Err(object_store::Error::NotFound {..}) => Ok(None),
            Err(e) => Err(e.into())
        }
    }

    pub async fn put (&self, rel: &str, contents: &[u8]) -> Result<()> {
        self.store.put( &self.key(rel), PutPayload::from( contents.to_vec())).await?;
        Ok(())
    }

    pub async fn delete (&self, rel: &str) -> Result<()> {
        match self.store.delete( &self.key(rel)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound {..}) => Ok(()),
            Err(e) => Err(e.into())
        }
    }

    /// download everything under a date prefix into dir. Returns the object count
    pub async fn sync_down (&self, rel_prefix: &str, dir: &Path) -> Result<usize> {
        ensure_writable_dir(dir)?;
        let prefix = self.key(rel_prefix);

        let mut count = 0;
        let mut listing = self.store.list( Some(&prefix));
        while let Some(meta) = listing.next().await {
            let meta = meta?;
            let Some(name) = meta.location.filename() else { continue };

            let bytes = self.store.get(&meta.location).await?.bytes().await?;
            fs::write( dir.join(name), &bytes)?;
            count += 1;
        }
        debug!("synced {} objects down from {}", count, rel_prefix);
        Ok(count)
    }

    /// upload every regular file of dir under the date prefix
    pub async fn sync_up (&self, rel_prefix: &str, dir: &Path) -> Result<usize> {
        let mut count = 0;
        if dir.is_dir() {
            for dir_entry in fs::read_dir(dir)? {
                let path = dir_entry?.path();
                if path.is_file() {
                    let name = path.file_name().unwrap().to_string_lossy().to_string();
                    let bytes = fs::read(&path)?;
                    self.put( &format!("{}/{}", rel_prefix, name), &bytes).await?;
                    count += 1;
                }
            }
        }
        debug!("synced {} files up to {}", count, rel_prefix);
        Ok(count)
    }
}
