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

/// gnssdaily - drive a per-day GNSS processing command over a date range.
///
/// Each date gets a working directory, a lock and a completion/fail marker, so
/// several gnssdaily processes (possibly on different machines when an object
/// store is configured) can share one range. The processing command is a shell
/// free argv template with ${...} date substitution, run inside the date's
/// working directory.
///
///   gnssdaily run daily.ron                    process the configured range
///   gnssdaily run daily.ron --dry-run          only print the visit order
///   gnssdaily stop daily.ron                   make running workers stop
///   gnssdaily restart daily.ron                clear the stop file again

use std::process::Command;

use anyhow::{anyhow,bail,Result};
use log::info;
use serde::{Serialize,Deserialize};
use structopt::StructOpt;

use gnss_config::load_config;
use gnss_daily::{DailyConfig,DailyScheduler,DayContext};
use gnss_daily::subst::expand;

#[macro_use]
extern crate lazy_static;

#[derive(StructOpt,Clone,Debug)]
enum Cmd {
    /// process the configured date range
    Run {
        /// scheduler config file (RON)
        config: String,

        /// override the configured start date
        #[structopt(long)]
        start_date: Option<String>,

        /// override the configured end date
        #[structopt(long)]
        end_date: Option<String>,

        /// only print the visit order, do not process
        #[structopt(long)]
        dry_run: bool
    },

    /// touch the stop file so running workers stop at their next date
    Stop {
        config: String
    },

    /// remove the stop file
    Restart {
        config: String
    }
}

/// command line argument structure
#[derive(StructOpt,Clone,Debug)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Cmd,

    /// increase logging level (can also be set with RUST_LOG env var)
    #[structopt(short,long)]
    verbose: bool
}

lazy_static! {
    static ref OPT: Opt = Opt::from_args();
}

/// scheduler config plus the per-date processing command
#[derive(Debug,Clone,Serialize,Deserialize)]
struct DailyRunConfig {
    scheduler: DailyConfig,

    /// argv template run per date in the date's working directory,
    /// e.g. "process_day --date ${yyyy}-${mm}-${dd} --dir ${base_dir}"
    command: String
}

fn load_run_config (path: &str) -> Result<DailyRunConfig> {
    load_config(path).map_err( |e| anyhow!("cannot load scheduler config {}: {}", path, e))
}

/// run the configured processing command for one date
fn process_day (cfg: &DailyRunConfig, ctx: &DayContext) -> Result<()> {
    let expanded = expand(&cfg.command, &ctx.vars)?;
    let argv: Vec<&str> = expanded.split_whitespace().collect();
    if argv.is_empty() {
        bail!("empty processing command");
    }

    let status = Command::new(argv[0])
        .args(&argv[1..])
        .current_dir(&ctx.target_dir)
        .status()
        .map_err( |e| anyhow!("cannot run '{}': {}", argv[0], e))?;

    if status.success() {
        Ok(())
    } else {
        bail!("'{}' exited with {}", expanded, status)
    }
}

#[tokio::main]
async fn main () -> Result<()> {
    let loglevel = if std::env::var(gnss_config::ENV_DEBUG).is_ok() {"debug"}
                   else if OPT.verbose {"info"} else {"warn"};
    env_logger::init_from_env( env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, loglevel));

    match &OPT.cmd {
        Cmd::Run { config, start_date, end_date, dry_run } => {
            let mut run_cfg = load_run_config(config)?;
            if let Some(sd) = start_date { run_cfg.scheduler.start_date = sd.clone(); }
            if let Some(ed) = end_date { run_cfg.scheduler.end_date = ed.clone(); }

            let scheduler = DailyScheduler::new( run_cfg.scheduler.clone())?;

            if *dry_run {
                for date in scheduler.visit_dates() {
                    println!("{}", date.format("%Y-%m-%d"));
                }
                return Ok(());
            }

            let mut callback = |ctx: &DayContext| process_day(&run_cfg, ctx);
            let report = scheduler.run(&mut callback).await?;

            info!("{} dates processed, {} complete, {} failed, {} skipped",
                  report.processed, report.completed, report.failed, report.skipped);
            if report.failed > 0 {
                bail!("{} dates failed", report.failed);
            }
            Ok(())
        }

        Cmd::Stop { config } => {
            let run_cfg = load_run_config(config)?;
            DailyScheduler::new(run_cfg.scheduler)?.request_stop()?;
            println!("stop requested");
            Ok(())
        }

        Cmd::Restart { config } => {
            let run_cfg = load_run_config(config)?;
            DailyScheduler::new(run_cfg.scheduler)?.clear_stop()?;
            println!("stop file cleared");
            Ok(())
        }
    }
}
