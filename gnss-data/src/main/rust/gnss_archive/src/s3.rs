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
use futures::StreamExt;
use log::debug;
use object_store::{ObjectStore,PutPayload,path::Path as ObjectPath};
use object_store::aws::{AmazonS3,AmazonS3Builder};

use crate::errors::{GnssArchiveError,Result};
use crate::{Archive,ArchiveCore,ArchiveInfo,join_path};

/// archive over `s3://bucket/prefix`. Region and further settings come from the
/// usual AWS environment; explicit credentials map to access key id and secret.
pub struct S3Archive {
    core: ArchiveCore,
    store: AmazonS3
}

impl S3Archive {
    pub fn new (info: ArchiveInfo) -> Result<S3Archive> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name( info.uri.host.clone());

        if let Some(cred) = &info.credentials {
            builder = builder
                .with_access_key_id( cred.username.clone())
                .with_secret_access_key( cred.password.clone());
        }

        let store = builder.build()?;
        Ok( S3Archive { core: ArchiveCore::new(info), store })
    }

    fn object_path (&self, path: &str, filename: &str) -> ObjectPath {
        let dir = join_path(&self.core.info.uri.base_path, path);
        ObjectPath::from( join_path(&dir, filename))
    }
}

#[async_trait]
impl Archive for S3Archive {
    fn core (&self) -> &ArchiveCore { &self.core }
    fn core_mut (&mut self) -> &mut ArchiveCore { &mut self.core }

    async fn connect (&mut self) -> Result<()> { Ok(()) } // requests are self-contained
    async fn disconnect (&mut self) {}

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>> {
        let prefix = self.object_path(path, "");
        let mut names = Vec::new();

        let mut stream = self.store.list( Some(&prefix));
        while let Some(meta) = stream.next().await {
            let meta = meta?;
            if let Some(name) = meta.location.filename() {
                names.push( name.to_string());
            }
        }
        Ok(names)
    }

    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()> {
        let key = self.object_path(path, filename);
        debug!("{}: get {}", self.core.info.name, key);

        let result = match self.store.get(&key).await {
            Ok(r) => r,
            Err(object_store::Error::NotFound {..}) => {
                return Err( GnssArchiveError::NotFound( format!("s3://{}/{}", self.core.info.uri.host, key)));
            }
            Err(e) => return Err(e.into())
        };

        let bytes = result.bytes().await?;
        let mut file = File::create(local)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    async fn raw_store (&mut self, local: &Path, path: &str, filename: &str) -> Result<()> {
        let key = self.object_path(path, filename);
        let bytes = std::fs::read(local)?;
        self.store.put(&key, PutPayload::from(bytes)).await?;
        Ok(())
    }

    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool> {
        let key = self.object_path(path, filename);
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound {..}) => Ok(false),
            Err(e) => Err(e.into())
        }
    }
}
