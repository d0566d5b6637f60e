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

use std::fs;
use std::path::{Path,PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use gnss_common::fs::{ensure_writable_dir,publish_file};
use crate::errors::{GnssArchiveError,Result};
use crate::{Archive,ArchiveCore,ArchiveInfo};

/// archive over a local directory tree (`file://`). Doubles as the cache base
/// and as retrieval target; stores publish via write-to-temp-then-rename so a
/// partially written file is never visible under its final name.
#[derive(Debug)]
pub struct FileArchive {
    core: ArchiveCore
}

impl FileArchive {
    pub fn new (info: ArchiveInfo) -> FileArchive {
        FileArchive { core: ArchiveCore::new(info) }
    }

    pub fn base_dir (&self) -> &str {
        &self.core.info.uri.base_path
    }

    fn dir_path (&self, path: &str) -> PathBuf {
        let mut pb = PathBuf::from(self.base_dir());
        if !path.is_empty() { pb.push(path); }
        pb
    }

    pub fn file_path (&self, path: &str, filename: &str) -> PathBuf {
        let mut pb = self.dir_path(path);
        pb.push(filename);
        pb
    }
}

#[async_trait]
impl Archive for FileArchive {
    fn core (&self) -> &ArchiveCore { &self.core }
    fn core_mut (&mut self) -> &mut ArchiveCore { &mut self.core }

    async fn connect (&mut self) -> Result<()> {
        if self.core.info.readonly {
            if !Path::new(self.base_dir()).is_dir() {
                return Err( GnssArchiveError::Transport( format!("no such directory {}", self.base_dir())));
            }
        } else {
            ensure_writable_dir(self.base_dir())?;
        }
        Ok(())
    }

    async fn disconnect (&mut self) {}

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>> {
        let dir = self.dir_path(path);
        let mut names = Vec::new();
        if dir.is_dir() {
            for dir_entry in fs::read_dir(&dir)? {
                let entry = dir_entry?;
                if entry.path().is_file() {
                    names.push( entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        Ok(names)
    }

    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()> {
        let src = self.file_path(path, filename);
        if !src.is_file() {
            return Err( GnssArchiveError::NotFound( format!("{:?}", src)));
        }
        fs::copy(&src, local)?;
        Ok(())
    }

    async fn raw_store (&mut self, local: &Path, path: &str, filename: &str) -> Result<()> {
        let dir = self.dir_path(path);
        ensure_writable_dir(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        fs::copy(local, tmp.path())?;
        let (_f, tmp_path) = tmp.keep().map_err(|e| GnssArchiveError::IOError(e.error))?;

        publish_file(&tmp_path, self.file_path(path, filename))?;
        Ok(())
    }

    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool> {
        Ok( self.file_path(path, filename).is_file())
    }
}
