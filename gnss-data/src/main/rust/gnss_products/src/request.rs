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

use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize};

use crate::errors::{GnssProductError,Result};
use crate::{ProductCatalog,SubtypeSpec};

/// lifecycle state of a queued request. COMPLETED and UNAVAILABLE are terminal
#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
pub enum RequestStatus {
    Requested,
    Pending,
    Delayed,
    Completed,
    Unavailable,
    Invalid
}

impl RequestStatus {
    pub fn is_terminal (&self) -> bool {
        matches!(*self, RequestStatus::Completed | RequestStatus::Unavailable)
    }

    /// resolver aggregation rank: COMPLETED > DELAYED > PENDING > UNAVAILABLE
    pub fn severity (&self) -> u32 {
        match *self {
            RequestStatus::Completed => 4,
            RequestStatus::Delayed => 3,
            RequestStatus::Pending => 2,
            RequestStatus::Unavailable => 1,
            RequestStatus::Requested | RequestStatus::Invalid => 0
        }
    }

    pub fn as_str (&self) -> &'static str {
        match *self {
            RequestStatus::Requested => "REQUESTED",
            RequestStatus::Pending => "PENDING",
            RequestStatus::Delayed => "DELAYED",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Unavailable => "UNAVAILABLE",
            RequestStatus::Invalid => "INVALID"
        }
    }

    pub fn from_str (s: &str) -> Option<RequestStatus> {
        match s {
            "REQUESTED" => Some(RequestStatus::Requested),
            "PENDING" => Some(RequestStatus::Pending),
            "DELAYED" => Some(RequestStatus::Delayed),
            "COMPLETED" => Some(RequestStatus::Completed),
            "UNAVAILABLE" => Some(RequestStatus::Unavailable),
            "INVALID" => Some(RequestStatus::Invalid),
            _ => None
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt (&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// a client request for one product over an epoch interval, on behalf of a job.
/// The subtype is kept in its raw spec form ("FINAL", "RAPID+", "") since it is
/// part of the request identity.
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct Request {
    pub job_id: String,
    pub type_code: String,
    pub subtype: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub station: Option<String>,

    pub status: RequestStatus,
    pub available_date: Option<DateTime<Utc>>,
    pub supplied_subtype: Option<String>,
    pub message: Option<String>
}

impl Request {
    pub fn new (job_id: impl ToString, type_code: impl ToString, subtype: impl ToString,
                start: DateTime<Utc>, end: DateTime<Utc>, station: Option<String>) -> Request {
        Request {
            job_id: job_id.to_string(),
            type_code: type_code.to_string(),
            subtype: subtype.to_string(),
            start, end, station,
            status: RequestStatus::Requested,
            available_date: None,
            supplied_subtype: None,
            message: None
        }
    }

    /// the unique identity of a request across jobs and invocations
    pub fn reqid (&self) -> String {
        format!("{}:{}:{}:{}:{}:{}",
            self.job_id, self.type_code, self.subtype,
            self.station.as_deref().unwrap_or(""),
            self.start.timestamp(), self.end.timestamp())
    }

    pub fn subtype_spec (&self) -> SubtypeSpec {
        SubtypeSpec::parse(&self.subtype)
    }

    /// structural validation against the catalog: known type, epoch order,
    /// station present iff the selected products use one
    pub fn validate (&self, catalog: &ProductCatalog) -> Result<()> {
        if self.start > self.end {
            return Err( GnssProductError::InvalidRequest( format!("start {} after end {}", self.start, self.end)));
        }
        if !catalog.has_type(&self.type_code) {
            return Err( GnssProductError::UnknownProduct( self.type_code.clone(), self.subtype.clone()));
        }

        let selected = catalog.select(&self.type_code, &self.subtype_spec());
        if selected.is_empty() {
            return Err( GnssProductError::UnknownProduct( self.type_code.clone(), self.subtype.clone()));
        }

        for pt in &selected {
            if pt.uses_station() && self.station.is_none() {
                return Err( GnssProductError::MissingStation);
            }
            if !pt.uses_station() && self.station.is_some() {
                return Err( GnssProductError::InvalidRequest(
                    format!("{}/{} does not take a station", pt.type_code, pt.subtype)));
            }
        }
        Ok(())
    }
}
