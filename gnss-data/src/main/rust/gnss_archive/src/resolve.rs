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

/// the multi-source resolver - decides where and when a request can be filled and
/// drives retrieval into a target archive.
///
/// Candidates are (product variant, archive) pairs: variants by descending subtype
/// priority, archives within a variant in two bands - archives explicitly listing
/// the request station first, wildcard-only archives second - each band by
/// descending archive priority. The first candidate that delivers every file of
/// the request wins; transport and wildcard failures only fail the candidate.

use std::cmp::min;
use std::path::{Path,PathBuf};

use chrono::{DateTime,Utc};
use log::{debug,info,warn};

use gnss_products::{ProductCatalog,ProductType};
use gnss_products::avail::{check_availability,ProductAvailability};
use gnss_products::request::{Request,RequestStatus};
use gnss_products::template::{file_specs,FileSpec};
use crate::compress::CompressionRegistry;
use crate::errors::{GnssArchiveError,Result};
use crate::{archive_name,fetch_file,resolve_filename,store_file,Archive};

/// aggregate result of one fulfillment pass over all candidates
#[derive(Debug)]
pub struct FillOutcome {
    pub status: RequestStatus,

    /// earliest availability (PENDING), suggested retry (DELAYED) or actual
    /// availability of the supplied variant (COMPLETED)
    pub available_date: Option<DateTime<Utc>>,

    pub supplied_subtype: Option<String>,

    /// target-relative specs of the files now present in the target archive
    pub files: Vec<FileSpec>,

    pub message: Option<String>
}

impl FillOutcome {
    fn unavailable (message: impl ToString) -> FillOutcome {
        FillOutcome {
            status: RequestStatus::Unavailable,
            available_date: None,
            supplied_subtype: None,
            files: Vec::new(),
            message: Some(message.to_string())
        }
    }
}

/// archive visit order for a station: explicitly-listing archives before
/// wildcard-only ones, descending archive priority within each band,
/// excluded-station archives dropped
pub fn candidate_archive_order (archives: &[Box<dyn Archive>], station: Option<&str>) -> Vec<usize> {
    let mut matching: Vec<usize> = Vec::new();
    let mut wildcard: Vec<usize> = Vec::new();

    for (i,arc) in archives.iter().enumerate() {
        let info = &arc.core().info;
        match station {
            Some(st) => {
                if info.excludes_station(st) {
                    continue;
                }
                if info.lists_station(st) {
                    matching.push(i);
                } else if info.has_station_wildcard() {
                    wildcard.push(i);
                }
            }
            None => matching.push(i)
        }
    }

    let by_priority = |a: &usize, b: &usize| {
        archives[*b].core().info.priority.cmp( &archives[*a].core().info.priority)
    };
    matching.sort_by(by_priority);
    wildcard.sort_by(by_priority);

    matching.extend(wildcard);
    matching
}

/// predict when any candidate could serve the request, without touching the
/// network. UNAVAILABLE iff no archive can ever serve it.
pub fn predict_availability (catalog: &ProductCatalog, archives: &[Box<dyn Archive>],
                             req: &Request, now: &DateTime<Utc>) -> FillOutcome {
    let variants = catalog.select(&req.type_code, &req.subtype_spec());
    if variants.is_empty() {
        return FillOutcome::unavailable( format!("no product variants for {}/{}", req.type_code, req.subtype));
    }

    let order = candidate_archive_order(archives, req.station.as_deref());
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut last_reason: Option<String> = None;

    for pt in &variants {
        for &ai in &order {
            let info = &archives[ai].core().info;
            if !info.carries(pt) { continue; }

            match check_availability( info.product_for(pt), &req.start, &req.end, now) {
                ProductAvailability::At { available_time, .. } => {
                    earliest = Some( earliest.map_or( available_time, |t| min(t, available_time)));
                }
                ProductAvailability::Never { reason } => { last_reason = Some(reason); }
            }
        }
    }

    match earliest {
        Some(available_date) => FillOutcome {
            status: RequestStatus::Pending,
            available_date: Some(available_date),
            supplied_subtype: None,
            files: Vec::new(),
            message: None
        },
        None => FillOutcome::unavailable( last_reason.unwrap_or_else(|| "no candidate archive".to_string()))
    }
}

/// one fulfillment pass: try candidates in order until one delivers, recording
/// PENDING/DELAYED times along the way. Only configuration errors propagate;
/// transport and wildcard failures are folded into the outcome.
pub async fn fill_request (catalog: &ProductCatalog, registry: &CompressionRegistry,
                           archives: &mut [Box<dyn Archive>], req: &Request,
                           target: &mut dyn Archive, tmp_dir: &Path,
                           now: &DateTime<Utc>) -> Result<FillOutcome> {
    let variants: Vec<ProductType> = catalog.select(&req.type_code, &req.subtype_spec())
        .into_iter().cloned().collect();
    if variants.is_empty() {
        return Ok( FillOutcome::unavailable( format!("no product variants for {}/{}", req.type_code, req.subtype)));
    }

    let order = candidate_archive_order(archives, req.station.as_deref());

    let mut pending_time: Option<DateTime<Utc>> = None;
    let mut retry_time: Option<DateTime<Utc>> = None;
    let mut message: Option<String> = None;

    for pt in &variants {
        for &ai in &order {
            let arc = archives[ai].as_mut();
            if !arc.core().info.carries(pt) { continue; }

            let apt = arc.core().info.product_for(pt).clone();
            let (available_time, fail_time) = match check_availability(&apt, &req.start, &req.end, now) {
                ProductAvailability::Never { reason } => {
                    debug!("{}: {}", archive_name(arc), reason);
                    if message.is_none() { message = Some(reason); }
                    continue;
                }
                ProductAvailability::At { available_time, fail_time } => (available_time, fail_time)
            };

            if available_time > *now {
                debug!("{}/{} not available from {} before {}", pt.type_code, pt.subtype, archive_name(arc), available_time);
                pending_time = Some( pending_time.map_or( available_time, |t| min(t, available_time)));
                continue;
            }

            match fetch_candidate(arc, registry, &apt, pt, req, target, tmp_dir).await {
                Ok(files) => {
                    info!("{}/{} for {} supplied by {} ({})", pt.type_code, pt.subtype, req.reqid(), archive_name(arc), pt.subtype);
                    return Ok( FillOutcome {
                        status: RequestStatus::Completed,
                        available_date: Some(available_time),
                        supplied_subtype: Some(pt.subtype.clone()),
                        files,
                        message: None
                    });
                }
                Err(e) if e.is_retryable() => {
                    let suggested = min( *now + apt.retry_duration(), fail_time);
                    warn!("{} cannot serve {}/{} now: {} (retry at {})", archive_name(arc), pt.type_code, pt.subtype, e, suggested);
                    retry_time = Some( retry_time.map_or( suggested, |t| min(t, suggested)));
                    message = Some( format!("{}: {}", archive_name(arc), e));
                }
                Err(e @ GnssArchiveError::ConfigError(_)) => return Err(e),
                Err(e) => {
                    warn!("{} failed on {}/{}: {}", archive_name(arc), pt.type_code, pt.subtype, e);
                    message = Some( format!("{}: {}", archive_name(arc), e));
                }
            }
        }
    }

    // COMPLETED > DELAYED > PENDING > UNAVAILABLE, earliest time wins for reporting
    let outcome = if let Some(retry) = retry_time {
        FillOutcome {
            status: RequestStatus::Delayed,
            available_date: Some( pending_time.map_or( retry, |p| min(p, retry))),
            supplied_subtype: None, files: Vec::new(), message
        }
    } else if let Some(available) = pending_time {
        FillOutcome {
            status: RequestStatus::Pending,
            available_date: Some(available),
            supplied_subtype: None, files: Vec::new(), message
        }
    } else {
        FillOutcome::unavailable( message.unwrap_or_else(|| "no candidate archive".to_string()))
    };
    Ok(outcome)
}

/// retrieve every file of one candidate into the target archive. Any failure
/// aborts the whole candidate; temp files never outlive the attempt
async fn fetch_candidate (arc: &mut dyn Archive, registry: &CompressionRegistry,
                          src_pt: &ProductType, pt: &ProductType, req: &Request,
                          target: &mut dyn Archive, tmp_dir: &Path) -> Result<Vec<FileSpec>> {
    let src_specs = file_specs(src_pt, req)?;
    let tgt_pt = target.core().info.product_for(pt).clone();
    let tgt_specs = file_specs(&tgt_pt, req)?;

    if src_specs.len() != tgt_specs.len() {
        return Err( GnssArchiveError::ConfigError(
            format!("source/target bucket mismatch for {}/{}", pt.type_code, pt.subtype)));
    }

    let mut stored = Vec::with_capacity(tgt_specs.len());
    for (src,tgt) in src_specs.iter().zip(tgt_specs.iter()) {
        fetch_one(arc, registry, src, tgt, target, tmp_dir).await?;
        stored.push( tgt.clone());
    }
    Ok(stored)
}

async fn fetch_one (arc: &mut dyn Archive, registry: &CompressionRegistry,
                    src: &FileSpec, tgt: &FileSpec,
                    target: &mut dyn Archive, tmp_dir: &Path) -> Result<()> {
    if crate::exists_file(target, &tgt.path, &tgt.filename).await.unwrap_or(false) {
        debug!("{} already holds {}/{}", archive_name(target), tgt.path, tgt.filename);
        return Ok(());
    }

    let filename = resolve_filename(arc, &src.path, &src.filename).await?;
    let fetched = fetch_file(arc, &src.path, &filename, tmp_dir).await?;

    let result = convert_and_store(arc, registry, &fetched, &filename, src, tgt, target, tmp_dir).await;
    let _ = std::fs::remove_file(&fetched);
    result
}

async fn convert_and_store (arc: &mut dyn Archive, registry: &CompressionRegistry,
                            fetched: &Path, filename: &str,
                            src: &FileSpec, tgt: &FileSpec,
                            target: &mut dyn Archive, tmp_dir: &Path) -> Result<()> {
    // declared archive compression wins, then suffix inference, then the product default
    let declared = arc.core().info.compression.clone();
    let from = declared.as_deref()
        .or_else(|| registry.infer_from_suffix(filename))
        .unwrap_or(&src.compression)
        .to_string();

    let converted = registry.convert(fetched, &from, &tgt.compression, tmp_dir)?;
    let result = store_file(target, &converted, &tgt.path, &tgt.filename).await;

    if converted != *fetched {
        let _ = std::fs::remove_file(&converted);
    }
    result
}
