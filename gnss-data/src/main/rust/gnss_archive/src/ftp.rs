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

use std::fs::File;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use log::{debug,info};
use suppaftp::FtpStream;

use crate::errors::{GnssArchiveError,Result,transport_error};
use crate::{Archive,ArchiveCore,ArchiveInfo,join_path};

/// archive over ftp. The control connection is long-lived and cycled by the
/// download budget; logins default to anonymous when no credentials are given.
pub struct FtpArchive {
    core: ArchiveCore,
    stream: Option<FtpStream>
}

impl FtpArchive {
    pub fn new (info: ArchiveInfo) -> FtpArchive {
        FtpArchive { core: ArchiveCore::new(info), stream: None }
    }

    fn remote_path (&self, path: &str, filename: &str) -> String {
        let dir = join_path(&self.core.info.uri.base_path, path);
        join_path(&dir, filename)
    }

    fn stream (&mut self) -> Result<&mut FtpStream> {
        self.stream.as_mut()
            .ok_or_else(|| GnssArchiveError::NotConnected( self.core.info.name.clone()))
    }
}

#[async_trait]
impl Archive for FtpArchive {
    fn core (&self) -> &ArchiveCore { &self.core }
    fn core_mut (&mut self) -> &mut ArchiveCore { &mut self.core }

    async fn connect (&mut self) -> Result<()> {
        let info = &self.core.info;
        let port = info.uri.port.unwrap_or(21);

        info!("{}: connecting to ftp://{}:{}", info.name, info.uri.host, port);
        let mut stream = FtpStream::connect( (info.uri.host.as_str(), port))?;

        match &info.credentials {
            Some(cred) => stream.login(&cred.username, &cred.password)?,
            None => stream.login("anonymous", "anonymous")?
        }
        stream.transfer_type( suppaftp::types::FileType::Binary)?;

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect (&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit(); // already disconnecting, nothing to do on error
        }
    }

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>> {
        let dir = self.remote_path(path, "");
        let names = self.stream()?.nlst( if dir.is_empty() { None } else { Some(dir.as_str()) })?;

        // some servers return full paths from NLST
        Ok( names.iter()
            .map( |n| n.rsplit('/').next().unwrap_or(n).to_string())
            .filter( |n| !n.is_empty())
            .collect())
    }

    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()> {
        let remote = self.remote_path(path, filename);
        debug!("{}: retr {}", self.core.info.name, remote);

        let buffer = self.stream()?.retr_as_buffer(&remote)?;
        let mut file = File::create(local)?;
        file.write_all( buffer.get_ref())?;
        Ok(())
    }

    async fn raw_store (&mut self, local: &Path, path: &str, filename: &str) -> Result<()> {
        let remote = self.remote_path(path, filename);
        let mut file = File::open(local)?;
        self.stream()?.put_file(&remote, &mut file)?;
        Ok(())
    }

    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool> {
        let remote = self.remote_path(path, filename);
        match self.stream()?.size(&remote) {
            Ok(_) => Ok(true),
            Err(suppaftp::FtpError::UnexpectedResponse(_)) => Ok(false),
            Err(e) => Err(e.into())
        }
    }
}
