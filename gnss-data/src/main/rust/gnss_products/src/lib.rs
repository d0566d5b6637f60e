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

//! gnss_products - the declarative model of reference GNSS data products.
//!
//! A [`ProductType`] describes one (type, subtype) variant of a product: where its
//! files live (filename/path templates), how often it is produced (cadence), when
//! it becomes available after its nominal time (supply cadence + latency), and how
//! it ranks against sibling subtypes (priority). The [`ProductCatalog`] holds the
//! validated set of all known variants. [`template`] materializes templates into
//! [`template::FileSpec`]s, [`avail`] predicts when a request can be served.

pub mod errors;
pub mod template;
pub mod avail;
pub mod request;

use std::time::Duration as StdDuration;
use chrono::{DateTime,Duration,Utc};
use serde::{Serialize,Deserialize};

use gnss_common::datetime::{deserialize_duration,serialize_duration};
use crate::errors::{GnssProductError,Result,catalog_error};

/// production interval of a product type
#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Hourly,
    ThreeHourly,
    SixHourly,
    Daily,
    Weekly
}

impl Cadence {
    pub fn secs (&self) -> i64 {
        match *self {
            Cadence::Hourly => 3600,
            Cadence::ThreeHourly => 3 * 3600,
            Cadence::SixHourly => 6 * 3600,
            Cadence::Daily => 86400,
            Cadence::Weekly => 7 * 86400
        }
    }

    pub fn duration (&self) -> Duration {
        Duration::seconds(self.secs())
    }
}

/// one (type, subtype) variant of a data product, as configured
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct ProductType {
    /// product type code (ORB, ERP, OBS, ...)
    #[serde(rename = "type")]
    pub type_code: String,

    /// product subtype code (FINAL, RAPID, ULTRA, ...)
    pub subtype: String,

    /// filename template with [token] substitutions, may contain * and ? wildcards
    pub filename: String,

    /// directory path template relative to the archive base
    pub path: String,

    pub cadence: Cadence,

    /// interval at which new instances are published (>= cadence)
    #[serde(default)]
    pub supply_cadence: Option<Cadence>,

    /// rank among subtypes of the same type, higher is preferred; 0 disables default selection
    pub priority: u32,

    /// delay between a bucket's nominal end and publication
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub latency: StdDuration,

    /// suggested wait before re-trying a failed retrieval
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub retry_interval: StdDuration,

    /// how long past the predicted availability we keep trying before giving up
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub max_delay: StdDuration,

    /// days a cached copy stays linked to its jobs
    pub retention_days: u32,

    /// days after which the product is overwritten at the source (0 = never).
    /// Rolling products such as ultra-rapid orbits cannot be retrieved once expired.
    #[serde(default)]
    pub expires_days: u32,

    /// compression pipeline the files are stored with (e.g. "hatanaka+compress", "gzip", "none")
    pub compression: String,

    /// product does not exist for epochs at or after this date
    #[serde(default)]
    pub valid_before: Option<DateTime<Utc>>,

    /// product does not exist for epochs before this date
    #[serde(default)]
    pub valid_after: Option<DateTime<Utc>>
}

impl ProductType {
    /// does the filename or path template reference a station code
    pub fn uses_station (&self) -> bool {
        template::references_station(&self.filename) || template::references_station(&self.path)
    }

    pub fn supply_cadence (&self) -> Cadence {
        self.supply_cadence.unwrap_or(self.cadence)
    }

    pub fn latency_duration (&self) -> Duration {
        Duration::from_std(self.latency).unwrap_or_else(|_| Duration::seconds(0))
    }

    pub fn retry_duration (&self) -> Duration {
        Duration::from_std(self.retry_interval).unwrap_or_else(|_| Duration::seconds(0))
    }

    pub fn max_delay_duration (&self) -> Duration {
        Duration::from_std(self.max_delay).unwrap_or_else(|_| Duration::seconds(0))
    }

    pub fn key (&self) -> (String,String) {
        (self.type_code.clone(), self.subtype.clone())
    }
}

/// a request's subtype selector: exact code, code with '+' suffix (this priority
/// or higher), or empty (any subtype with priority > 0)
#[derive(Debug,Clone,PartialEq,Eq)]
pub enum SubtypeSpec {
    Exact(String),
    OrHigher(String),
    Any
}

impl SubtypeSpec {
    pub fn parse (s: &str) -> SubtypeSpec {
        let s = s.trim();
        if s.is_empty() {
            SubtypeSpec::Any
        } else if let Some(base) = s.strip_suffix('+') {
            SubtypeSpec::OrHigher(base.to_string())
        } else {
            SubtypeSpec::Exact(s.to_string())
        }
    }

    pub fn as_str (&self) -> String {
        match self {
            SubtypeSpec::Exact(s) => s.clone(),
            SubtypeSpec::OrHigher(s) => format!("{}+", s),
            SubtypeSpec::Any => String::new()
        }
    }
}

/// the validated, immutable set of known product variants. Loaded once from
/// configuration, shared by resolver, cache and archives thereafter.
#[derive(Debug,Clone)]
pub struct ProductCatalog {
    types: Vec<ProductType>
}

impl ProductCatalog {
    pub fn new (defs: Vec<ProductType>) -> Result<ProductCatalog> {
        let catalog = ProductCatalog { types: defs };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate (&self) -> Result<()> {
        for (i,pt) in self.types.iter().enumerate() {
            if pt.supply_cadence().secs() < pt.cadence.secs() {
                return Err( catalog_error( format!("{}/{}: supply cadence shorter than cadence", pt.type_code, pt.subtype)));
            }

            for other in &self.types[i+1..] {
                if other.type_code == pt.type_code && other.subtype == pt.subtype {
                    return Err( catalog_error( format!("duplicate product definition {}/{}", pt.type_code, pt.subtype)));
                }
            }

            template::check_template(&pt.filename)
                .map_err(|e| catalog_error( format!("{}/{} filename: {}", pt.type_code, pt.subtype, e)))?;
            template::check_template(&pt.path)
                .map_err(|e| catalog_error( format!("{}/{} path: {}", pt.type_code, pt.subtype, e)))?;
        }
        Ok(())
    }

    /// validate an archive-local override against this catalog: same cadence and priority
    pub fn check_override (&self, ov: &ProductType) -> Result<()> {
        if let Some(base) = self.lookup(&ov.type_code, &ov.subtype) {
            if base.cadence != ov.cadence {
                return Err( catalog_error( format!("override {}/{} changes cadence", ov.type_code, ov.subtype)));
            }
            if base.priority != ov.priority {
                return Err( catalog_error( format!("override {}/{} changes priority", ov.type_code, ov.subtype)));
            }
        }
        Ok(())
    }

    pub fn is_empty (&self) -> bool { self.types.is_empty() }

    pub fn iter (&self) -> std::slice::Iter<'_,ProductType> { self.types.iter() }

    pub fn lookup (&self, type_code: &str, subtype: &str) -> Option<&ProductType> {
        self.types.iter().find( |pt| pt.type_code == type_code && pt.subtype == subtype)
    }

    pub fn has_type (&self, type_code: &str) -> bool {
        self.types.iter().any( |pt| pt.type_code == type_code)
    }

    /// the subtype variants selected by a spec, ranked by descending priority
    pub fn select (&self, type_code: &str, spec: &SubtypeSpec) -> Vec<&ProductType> {
        let mut selected: Vec<&ProductType> = match spec {
            SubtypeSpec::Exact(st) => {
                self.types.iter().filter( |pt| pt.type_code == type_code && &pt.subtype == st).collect()
            }
            SubtypeSpec::OrHigher(st) => {
                match self.lookup(type_code, st) {
                    Some(base) => self.types.iter()
                        .filter( |pt| pt.type_code == type_code && pt.priority >= base.priority)
                        .collect(),
                    None => Vec::new()
                }
            }
            SubtypeSpec::Any => {
                self.types.iter().filter( |pt| pt.type_code == type_code && pt.priority > 0).collect()
            }
        };

        selected.sort_by( |a,b| b.priority.cmp(&a.priority));
        selected
    }
}
