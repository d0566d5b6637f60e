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

use std::io::Write;
use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use log::{debug,info};
use regex::Regex;

use crate::errors::{GnssArchiveError,Result,transport_error};
use crate::{Archive,ArchiveCore,ArchiveInfo,ArchiveScheme,join_path};

/// archive over plain http(s). Directory listings are parsed from the server's
/// index HTML (href attributes), which is what the public GNSS datacenters serve.
pub struct HttpArchive {
    core: ArchiveCore,
    client: reqwest::Client
}

impl HttpArchive {
    pub fn new (info: ArchiveInfo) -> Result<HttpArchive> {
        let client = reqwest::Client::builder()
            .timeout(info.timeout)
            .cookie_store(true)
            .build()?;
        Ok( HttpArchive { core: ArchiveCore::new(info), client })
    }

    fn base_url (&self) -> String {
        let info = &self.core.info;
        let scheme = if info.uri.scheme == ArchiveScheme::Https { "https" } else { "http" };
        let port = info.uri.port.map( |p| format!(":{}", p)).unwrap_or_default();
        format!("{}://{}{}/{}", scheme, info.uri.host, port, info.uri.base_path)
    }

    fn url_for (&self, path: &str, filename: &str) -> String {
        let dir = join_path(&self.base_url(), path);
        join_path(&dir, filename)
    }

    fn request (&self, url: &str) -> reqwest::RequestBuilder {
        let mut rb = self.client.get(url);
        if let Some(cred) = &self.core.info.credentials {
            rb = rb.basic_auth(&cred.username, Some(&cred.password));
        }
        rb
    }
}

/// parse filenames out of an index HTML page - one name per href that does not
/// look like a navigation link
pub fn parse_index_listing (html: &str) -> Vec<String> {
    // watch out - index formats differ between servers, keep the pattern loose
    let re = Regex::new(r#"href="([^"/?][^"/]*)""#).unwrap();
    re.captures_iter(html)
        .map( |cap| cap[1].to_string())
        .filter( |name| !name.starts_with('.') && !name.starts_with('#'))
        .collect()
}

async fn download_to (response: reqwest::Response, local: &Path) -> Result<()> {
    let mut file = File::create(local)?;
    let mut response = response;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
    }
    Ok(())
}

#[async_trait]
impl Archive for HttpArchive {
    fn core (&self) -> &ArchiveCore { &self.core }
    fn core_mut (&mut self) -> &mut ArchiveCore { &mut self.core }

    async fn connect (&mut self) -> Result<()> { Ok(()) } // http is connectionless
    async fn disconnect (&mut self) {}

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>> {
        let url = join_path(&self.base_url(), path);
        let response = self.request(&url).send().await?;
        if !response.status().is_success() {
            return Err( transport_error( format!("list {} failed with status {}", url, response.status())));
        }
        let html = response.text().await?;
        Ok( parse_index_listing(&html))
    }

    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()> {
        let url = self.url_for(path, filename);
        debug!("fetching {}", url);

        let response = self.request(&url).send().await?;
        match response.status() {
            s if s.is_success() => download_to(response, local).await,
            s if s == http::StatusCode::NOT_FOUND.as_u16() => Err( GnssArchiveError::NotFound(url)),
            s => Err( transport_error( format!("get {} failed with status {}", url, s)))
        }
    }

    async fn raw_store (&mut self, _local: &Path, _path: &str, _filename: &str) -> Result<()> {
        Err( GnssArchiveError::ConfigError( format!("http archive '{}' is not writable", self.core.info.name)))
    }

    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool> {
        let url = self.url_for(path, filename);
        let mut rb = self.client.head(&url);
        if let Some(cred) = &self.core.info.credentials {
            rb = rb.basic_auth(&cred.username, Some(&cred.password));
        }
        let response = rb.send().await?;
        Ok( response.status().is_success())
    }
}

/// https archive that exchanges credentials for session cookies at a configured
/// endpoint before the first transfer. The cookie jar lives in the client, so a
/// reconnect re-runs the exchange.
pub struct TokenHttpArchive {
    inner: HttpArchive
}

impl TokenHttpArchive {
    pub fn new (info: ArchiveInfo) -> Result<TokenHttpArchive> {
        if info.auth_url.is_none() {
            return Err( GnssArchiveError::ConfigError( format!("token archive '{}' has no auth_url", info.name)));
        }
        Ok( TokenHttpArchive { inner: HttpArchive::new(info)? })
    }
}

#[async_trait]
impl Archive for TokenHttpArchive {
    fn core (&self) -> &ArchiveCore { self.inner.core() }
    fn core_mut (&mut self) -> &mut ArchiveCore { self.inner.core_mut() }

    async fn connect (&mut self) -> Result<()> {
        let info = &self.inner.core.info;
        let auth_url = info.auth_url.as_deref().unwrap(); // checked at construction
        let cred = info.credentials.as_ref()
            .ok_or_else(|| GnssArchiveError::ConfigError( format!("token archive '{}' has no credentials", info.name)))?;

        info!("{}: acquiring session token", info.name);
        let response = self.inner.client.post(auth_url)
            .form( &[("username", cred.username.as_str()), ("password", cred.password.as_str())])
            .send().await?;

        if response.status().is_success() {
            Ok(()) // session cookies are now in the jar
        } else {
            Err( transport_error( format!("token exchange at {} failed with status {}", auth_url, response.status())))
        }
    }

    async fn disconnect (&mut self) {
        // cookies expire server side; dropping the budget state is enough
    }

    async fn raw_list (&mut self, path: &str) -> Result<Vec<String>> {
        self.inner.raw_list(path).await
    }

    async fn raw_fetch (&mut self, path: &str, filename: &str, local: &Path) -> Result<()> {
        self.inner.raw_fetch(path, filename, local).await
    }

    async fn raw_store (&mut self, local: &Path, path: &str, filename: &str) -> Result<()> {
        self.inner.raw_store(local, path, filename).await
    }

    async fn raw_exists (&mut self, path: &str, filename: &str) -> Result<bool> {
        self.inner.raw_exists(path, filename).await
    }
}
