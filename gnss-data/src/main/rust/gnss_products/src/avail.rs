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

/// availability prediction - when can a product variant be expected at its sources.
///
/// Publication is aligned to the supply cadence: a request ending at t_end is
/// published at ceil((t_end - E0)/supply)*supply + E0 + latency. Rolling products
/// (expires_days > 0) and validity fences make a request authoritatively
/// unavailable, which is never retried.

use chrono::{DateTime,Duration,Utc};

use gnss_common::datetime::ceil_time;
use crate::ProductType;

#[derive(Debug,Clone,PartialEq)]
pub enum ProductAvailability {
    /// the product is (or will be) published; compare available_time against now
    At { available_time: DateTime<Utc>, fail_time: DateTime<Utc> },

    /// the product can never be retrieved for this interval
    Never { reason: String }
}

impl ProductAvailability {
    pub fn available_time (&self) -> Option<DateTime<Utc>> {
        match self {
            ProductAvailability::At { available_time, .. } => Some(*available_time),
            ProductAvailability::Never { .. } => None
        }
    }
}

pub fn check_availability (pt: &ProductType, start: &DateTime<Utc>, end: &DateTime<Utc>,
                           now: &DateTime<Utc>) -> ProductAvailability {
    if let Some(before) = &pt.valid_before {
        if start >= before {
            return ProductAvailability::Never {
                reason: format!("{}/{} not produced for epochs at or after {}", pt.type_code, pt.subtype, before)
            };
        }
    }
    if let Some(after) = &pt.valid_after {
        if end < after {
            return ProductAvailability::Never {
                reason: format!("{}/{} not produced for epochs before {}", pt.type_code, pt.subtype, after)
            };
        }
    }

    // rolling products are overwritten at the source after expires_days
    if pt.expires_days > 0 && *start + Duration::days(pt.expires_days as i64) < *now {
        return ProductAvailability::Never {
            reason: format!("{}/{} expired at the source ({} day rollover)", pt.type_code, pt.subtype, pt.expires_days)
        };
    }

    let supply = pt.supply_cadence().duration();
    let available_time = ceil_time(end, supply) + pt.latency_duration();
    let fail_time = available_time + pt.max_delay_duration();

    ProductAvailability::At { available_time, fail_time }
}
