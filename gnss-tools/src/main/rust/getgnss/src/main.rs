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

/// getgnss - fetch reference GNSS products (orbits, earth rotation parameters,
/// station observations) from the configured archive cascade into the local
/// cache, optionally delivering them into a target directory.
///
/// Exit codes encode the final request status so processing scripts can branch:
///   0  COMPLETED     products delivered
///   2  PENDING       not yet published, queued if --queue was given
///   3  DELAYED       published but not retrievable right now
///   4  UNAVAILABLE   will never be retrievable
///   5  INVALID       malformed request

use std::process::exit;
use std::time::Duration as StdDuration;

use chrono::Utc;
use structopt::StructOpt;
use anyhow::{anyhow,Context as AnyhowContext,Result};
use log::info;

use gnss_archive::{create_archive,Archive,ArchiveConfig};
use gnss_cache::{AcquisitionConfig,Context,GetDataOpts};
use gnss_common::datetime::parse_gnss_date;
use gnss_config::{env_or,load_config,store_config,ENV_CONFIG_FILE};
use gnss_products::request::{Request,RequestStatus};

#[macro_use]
extern crate lazy_static;

/// command line argument structure
#[derive(StructOpt,Clone,Debug)]
struct Opt {
    /// date of the requested products (yyyy-mm-dd, yyyy/ddd or wwww/d)
    date: Option<String>,

    /// product type code (ORB, ERP, OBS, ...)
    type_code: Option<String>,

    /// product subtype; append '+' for "this priority or higher", omit for any
    #[structopt(default_value = "")]
    subtype: String,

    /// station code for per-station products
    #[structopt(long)]
    station: Option<String>,

    /// acquisition config file (RON; GNSS_CONFIG overrides)
    #[structopt(long, default_value = "gnss.ron")]
    config: String,

    /// deliver the products into this directory
    #[structopt(long)]
    target_dir: Option<String>,

    /// only consult the named archive
    #[structopt(long)]
    source_archive: Option<String>,

    /// queue the request so later fill-pending runs keep trying
    #[structopt(long)]
    queue: bool,

    /// do not download, only queue/report
    #[structopt(long)]
    no_download: bool,

    /// job id owning the queued request
    #[structopt(long, default_value = "adhoc")]
    job: String,

    /// list the configured product types and exit
    #[structopt(long)]
    list_types: bool,

    /// write an example config file and exit
    #[structopt(long)]
    generate_config: Option<String>,

    /// increase logging level (can also be set with RUST_LOG env var)
    #[structopt(short,long)]
    verbose: bool
}

lazy_static! {
    static ref OPT: Opt = Opt::from_args();
}

fn list_types (ctx: &Context) {
    println!("{:<6} {:<10} {:>8}  {:<12} {}", "type", "subtype", "priority", "cadence", "latency");
    for pt in ctx.catalog.iter() {
        println!("{:<6} {:<10} {:>8}  {:<12} {:?}", pt.type_code, pt.subtype, pt.priority,
                 format!("{:?}", pt.cadence).to_lowercase(), pt.latency);
    }
}

fn status_exit_code (status: RequestStatus) -> i32 {
    match status {
        RequestStatus::Completed => 0,
        RequestStatus::Pending => 2,
        RequestStatus::Delayed => 3,
        RequestStatus::Unavailable => 4,
        _ => 5
    }
}

fn target_archive (dir: &str, ctx: &Context) -> Result<Box<dyn Archive>> {
    let cfg = ArchiveConfig {
        name: "target".to_string(),
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
    create_archive(&cfg, &ctx.catalog).map_err( |e| anyhow!("cannot open target dir: {}", e))
}

#[tokio::main]
async fn main () -> Result<()> {
    let loglevel = if std::env::var(gnss_config::ENV_DEBUG).is_ok() {"debug"}
                   else if OPT.verbose {"info"} else {"warn"};
    env_logger::init_from_env( env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, loglevel));

    if let Some(path) = &OPT.generate_config {
        let written = store_config( &example_config(), path)
            .map_err( |e| anyhow!("cannot write example config: {}", e))?;
        println!("example config written to {}", written);
        return Ok(());
    }

    let config_path = env_or(ENV_CONFIG_FILE, &OPT.config);
    let acq: AcquisitionConfig = load_config(&config_path)
        .map_err( |e| anyhow!("cannot load config {}: {}", config_path, e))?;
    let mut ctx = Context::from_config(&acq)
        .map_err( |e| anyhow!("invalid configuration: {}", e))?;

    if OPT.list_types {
        list_types(&ctx);
        return Ok(());
    }

    let date_arg = OPT.date.as_deref().ok_or_else(|| anyhow!("no date given"))?;
    let type_arg = OPT.type_code.as_deref().ok_or_else(|| anyhow!("no product type given"))?;
    let date = parse_gnss_date(date_arg).ok_or_else(|| anyhow!("bad date '{}'", date_arg))?;

    if let Some(name) = &OPT.source_archive {
        ctx.restrict_to_archive(name).map_err( |e| anyhow!("{}", e))?;
    }

    let req = Request::new( &OPT.job, type_arg, &OPT.subtype, date, date, OPT.station.clone());

    let mut target = match &OPT.target_dir {
        Some(dir) => Some( target_archive(dir, &ctx)?),
        None => None
    };

    let opts = GetDataOpts { queue: OPT.queue, download: !OPT.no_download };
    let now = Utc::now();
    let target_ref: Option<&mut dyn Archive> = match &mut target {
        Some(t) => Some(t.as_mut()),
        None => None
    };
    let result = ctx.get_data(&req, target_ref, opts, &now).await
        .with_context(|| "request failed")?;

    let req = &result.request;
    match req.status {
        RequestStatus::Completed => {
            println!("COMPLETED {}/{}", req.type_code, req.supplied_subtype.as_deref().unwrap_or(&req.subtype));
        }
        RequestStatus::Pending | RequestStatus::Delayed => {
            let when = result.next_check.or(req.available_date)
                .map( |d| d.to_rfc3339()).unwrap_or_else(|| "unknown".to_string());
            println!("{} {}/{} retry after {}", req.status, req.type_code, req.subtype, when);
        }
        _ => {
            println!("{} {}/{} {}", req.status, req.type_code, req.subtype,
                     req.message.as_deref().unwrap_or(""));
        }
    }

    exit( status_exit_code(req.status));
}

/// a small but workable starting configuration: IGS final/rapid orbits from a
/// public archive and a local cache
fn example_config () -> AcquisitionConfig {
    use gnss_archive::compress::{CompressionType,SuffixRule};
    use gnss_cache::CacheConfig;
    use gnss_products::{Cadence,ProductType};

    let orbit = |subtype: &str, priority: u32, latency_h: u64| {
        let filename = if subtype == "FINAL" { "igs[wwww][d].sp3.Z" } else { "igr[wwww][d].sp3.Z" };
        ProductType {
            type_code: "ORB".to_string(),
            subtype: subtype.to_string(),
            filename: filename.to_string(),
            path: "products/[wwww]".to_string(),
            cadence: Cadence::Daily,
            supply_cadence: None,
            priority,
            latency: StdDuration::from_secs(latency_h * 3600),
            retry_interval: StdDuration::from_secs(3600),
            max_delay: StdDuration::from_secs(14 * 86400),
            retention_days: 30,
            expires_days: 0,
            compression: "compress".to_string(),
            valid_before: None,
            valid_after: None
        }
    };

    AcquisitionConfig {
        compression_types: vec![
            CompressionType {
                name: "gzip".to_string(),
                compress: Some("gzip -c $in".to_string()),
                uncompress: Some("gzip -d -c $in".to_string()),
                presuffix: "".to_string(),
                postsuffix: ".gz".to_string()
            },
            CompressionType {
                name: "compress".to_string(),
                compress: Some("compress -c $in".to_string()),
                uncompress: Some("uncompress -c $in".to_string()),
                presuffix: "".to_string(),
                postsuffix: ".Z".to_string()
            },
            CompressionType {
                name: "hatanaka".to_string(),
                compress: Some("rnx2crx $in -".to_string()),
                uncompress: Some("crx2rnx $in -".to_string()),
                presuffix: "o".to_string(),
                postsuffix: "d".to_string()
            }
        ],
        compression_suffices: vec![
            SuffixRule { suffix: ".gz".to_string(), compression: "gzip".to_string() },
            SuffixRule { suffix: ".Z".to_string(), compression: "compress".to_string() },
            SuffixRule { suffix: "d.gz".to_string(), compression: "hatanaka+gzip".to_string() },
            SuffixRule { suffix: "d.Z".to_string(), compression: "hatanaka+compress".to_string() }
        ],
        data_types: vec![ orbit("FINAL", 100, 12*24), orbit("RAPID", 50, 17)],
        data_centers: vec![
            ArchiveConfig {
                name: "igs-cddis".to_string(),
                uri: "https://cddis.nasa.gov/archive/gnss".to_string(),
                priority: 10,
                credentials: None,
                credentials_file: None,
                stations: vec!["*".to_string()],
                excluded_stations: Vec::new(),
                datatypes: Vec::new(),
                overrides: Vec::new(),
                max_downloads_per_connection: 250,
                readonly: true,
                timeout: StdDuration::from_secs(120),
                compression: None,
                auth_url: None
            }
        ],
        cache: CacheConfig {
            dir: "cache".to_string(),
            tmp_dir: None,
            job_retention_days: 7,
            queue_latency: StdDuration::from_secs(600)
        }
    }
}
