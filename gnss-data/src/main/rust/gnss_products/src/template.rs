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

/// filename templating - expands the bracketed time/station/job tokens of product
/// filename and path templates over cadence-aligned time buckets.
///
/// Token case controls replacement case ([SSSS] vs [ssss]), tokens may carry
/// day offsets ([yyyy+14], [ddd-2]), `${VAR}` environment references are expanded
/// first, and `*`/`?` wildcards pass through for archive-side resolution.

use chrono::{DateTime,Datelike,Timelike,Duration,Utc};
use regex::Regex;

use gnss_common::datetime::{day_of_year,gps_week,gps_week_day,gnss_epoch,hour_letter,hour_of_letter,time_buckets,naive_utc_date_to_utc_datetime};
use gnss_common::strings::{is_mixed_case,is_all_uppercase};
use crate::errors::{GnssProductError,Result};
use crate::ProductType;
use crate::request::Request;

/// a fully materialized product file: no unresolved placeholders left except wildcards
#[derive(Debug,Clone,PartialEq)]
pub struct FileSpec {
    pub type_code: String,
    pub subtype: String,
    pub path: String,
    pub filename: String,
    pub compression: String,
    pub station: Option<String>,
    pub timestamp: DateTime<Utc>
}

impl FileSpec {
    pub fn relative_path (&self) -> String {
        if self.path.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.path, self.filename)
        }
    }

    pub fn has_wildcards (&self) -> bool {
        has_wildcards(&self.filename)
    }
}

pub fn has_wildcards (s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// the variables a template is expanded over
#[derive(Debug,Clone)]
pub struct TemplateVars<'a> {
    pub time: DateTime<Utc>,
    pub station: Option<&'a str>,
    pub job_id: &'a str,
    pub type_code: &'a str,
    pub subtype: &'a str
}

/// does a template reference the station token (any case)
pub fn references_station (template: &str) -> bool {
    let mut found = false;
    let _ = for_each_token(template, &mut |name,_offs| {
        if name.eq_ignore_ascii_case("ssss") { found = true; }
        Ok(())
    });
    found
}

/// structural template validation - every bracketed token must be known
pub fn check_template (template: &str) -> std::result::Result<(),String> {
    for_each_token(template, &mut |name,_offs| {
        if !is_known_token(name) {
            Err(format!("unknown token [{}]", name))
        } else {
            Ok(())
        }
    })
}

fn is_known_token (name: &str) -> bool {
    matches!( name.to_ascii_lowercase().as_str(),
        "yyyy" | "yy" | "mm" | "dd" | "ddd" | "wwww" | "ww" | "d" | "hh" | "h" |
        "ssss" | "job" | "type" | "subtype")
}

/// scan bracketed tokens, calling f(name, day_offset) for each; Err aborts the scan
fn for_each_token (template: &str, f: &mut dyn FnMut(&str,i64) -> std::result::Result<(),String>) -> std::result::Result<(),String> {
    let mut rest = template;
    while let Some(i) = rest.find('[') {
        let after = &rest[i+1..];
        match after.find(']') {
            Some(j) => {
                let (name,offs) = split_token(&after[..j])?;
                f(name, offs)?;
                rest = &after[j+1..];
            }
            None => return Err(format!("unterminated token in '{}'", template))
        }
    }
    Ok(())
}

/// split "ddd-2" into ("ddd", -2), "yyyy" into ("yyyy", 0)
fn split_token (token: &str) -> std::result::Result<(&str,i64),String> {
    match token.find( |c| c == '+' || c == '-') {
        Some(k) => {
            let name = &token[..k];
            let offs: i64 = token[k..].parse().map_err( |_| format!("bad day offset in [{}]", token))?;
            Ok((name, offs))
        }
        None => Ok((token, 0))
    }
}

/// expand a template over the given variables. Environment references first,
/// bracketed tokens second; wildcards are copied through verbatim.
pub fn expand (template: &str, vars: &TemplateVars) -> Result<String> {
    let s = gnss_config::expand_env_refs(template)?;

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();

    while let Some(i) = rest.find('[') {
        out.push_str(&rest[..i]);
        let after = &rest[i+1..];
        let j = after.find(']')
            .ok_or_else(|| GnssProductError::TemplateError(template.to_string(), "unterminated token".to_string()))?;
        let token = &after[..j];
        out.push_str( &replace_token(template, token, vars)?);
        rest = &after[j+1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn replace_token (template: &str, token: &str, vars: &TemplateVars) -> Result<String> {
    let (name,offs) = split_token(token)
        .map_err(|e| GnssProductError::TemplateError(template.to_string(), e))?;
    let t = vars.time + Duration::days(offs);
    let upper = is_all_uppercase(name);

    let rep = match name.to_ascii_lowercase().as_str() {
        "yyyy" => format!("{:04}", t.year()),
        "yy"   => format!("{:02}", t.year().rem_euclid(100)),
        "mm"   => format!("{:02}", t.month()),
        "dd"   => format!("{:02}", t.day()),
        "ddd"  => format!("{:03}", day_of_year(&t)),
        "wwww" => format!("{:04}", gps_week(&t)),
        "ww"   => format!("{:02}", gps_week(&t).rem_euclid(100)),
        "d"    => format!("{}", gps_week_day(&t)),
        "hh"   => format!("{:02}", t.hour()),
        "h"    => cased( &hour_letter(t.hour()).to_string(), upper),
        "ssss" => station_code( vars.station.ok_or(GnssProductError::MissingStation)?, upper),
        "job"  => cased( vars.job_id, upper),
        "type" => cased( vars.type_code, upper),
        "subtype" => cased( vars.subtype, upper),
        _ => return Err( GnssProductError::UnknownToken(name.to_string()))
    };
    Ok(rep)
}

fn cased (s: &str, upper: bool) -> String {
    if upper { s.to_uppercase() } else { s.to_lowercase() }
}

/// configured mixed-case station codes keep their case, otherwise the token case decides
fn station_code (station: &str, upper: bool) -> String {
    if is_mixed_case(station) {
        station.to_string()
    } else {
        cased(station, upper)
    }
}

/// the deterministic, finite FileSpec list for one product variant and request:
/// one spec per cadence bucket intersecting [start,end], in ascending bucket order
pub fn file_specs (pt: &ProductType, req: &Request) -> Result<Vec<FileSpec>> {
    if pt.uses_station() && req.station.is_none() {
        return Err( GnssProductError::MissingStation);
    }

    let mut specs = Vec::new();
    for bucket in time_buckets(&req.start, &req.end, pt.cadence.duration()) {
        let vars = TemplateVars {
            time: bucket,
            station: req.station.as_deref(),
            job_id: &req.job_id,
            type_code: &pt.type_code,
            subtype: &pt.subtype
        };

        specs.push( FileSpec {
            type_code: pt.type_code.clone(),
            subtype: pt.subtype.clone(),
            path: expand(&pt.path, &vars)?,
            filename: expand(&pt.filename, &vars)?,
            compression: pt.compression.clone(),
            station: req.station.clone(),
            timestamp: bucket
        });
    }
    Ok(specs)
}

//--- template inversion

/// time bucket and station recovered from a concrete filename
#[derive(Debug,Clone,PartialEq)]
pub struct ParsedName {
    pub time: Option<DateTime<Utc>>,
    pub station: Option<String>
}

/// match a concrete filename against a template and recover the time bucket and
/// station it was expanded from. Only offset-free tokens contribute to the
/// reconstructed time. None if the name does not match the template at all.
pub fn parse_filename (template: &str, name: &str) -> Option<ParsedName> {
    let mut token_info: Vec<(String,i64)> = Vec::new();
    let mut pattern = String::from("^");
    let mut rest = template;

    while let Some(i) = rest.find('[') {
        pattern.push_str( &wildcard_quoted(&rest[..i]));
        let after = &rest[i+1..];
        let j = after.find(']')?;
        let (tname,offs) = split_token(&after[..j]).ok()?;
        pattern.push_str( token_pattern(tname)?);
        token_info.push( (tname.to_ascii_lowercase(), offs));
        rest = &after[j+1..];
    }
    pattern.push_str( &wildcard_quoted(rest));
    pattern.push('$');

    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(name)?;

    let mut year: Option<i32> = None;
    let mut month: Option<u32> = None;
    let mut day: Option<u32> = None;
    let mut doy: Option<u32> = None;
    let mut week: Option<i64> = None;
    let mut week_day: Option<i64> = None;
    let mut hour: Option<u32> = None;
    let mut station: Option<String> = None;

    for (k,(tname,offs)) in token_info.iter().enumerate() {
        let v = caps.get(k+1)?.as_str();
        if *offs != 0 { continue; } // offset fields cannot be inverted per-field

        match tname.as_str() {
            "yyyy" => year = v.parse().ok(),
            "yy" => year = v.parse::<i32>().ok().map( |y| if y < 80 { y + 2000 } else { y + 1900 }),
            "mm" => month = v.parse().ok(),
            "dd" => day = v.parse().ok(),
            "ddd" => doy = v.parse().ok(),
            "wwww" => week = v.parse().ok(),
            "d" => week_day = v.parse().ok(),
            "hh" => hour = v.parse().ok(),
            "h" => hour = hour_of_letter( v.chars().next()?),
            "ssss" => station = Some(v.to_string()),
            _ => {}
        }
    }

    let date = if let (Some(w),Some(wd)) = (week,week_day) {
        Some( gnss_epoch() + Duration::days(w*7 + wd))
    } else if let (Some(y),Some(n)) = (year,doy) {
        chrono::NaiveDate::from_yo_opt(y, n).map(naive_utc_date_to_utc_datetime)
    } else if let (Some(y),Some(m),Some(d)) = (year,month,day) {
        chrono::NaiveDate::from_ymd_opt(y, m, d).map(naive_utc_date_to_utc_datetime)
    } else {
        None
    };

    let time = date.map( |d| d + Duration::hours(hour.unwrap_or(0) as i64));
    Some( ParsedName { time, station })
}

fn token_pattern (name: &str) -> Option<&'static str> {
    let p = match name.to_ascii_lowercase().as_str() {
        "yyyy" | "wwww" => r"(\d{4})",
        "yy" | "mm" | "dd" | "ww" | "hh" => r"(\d{2})",
        "ddd" => r"(\d{3})",
        "d" => r"(\d)",
        "h" => r"([a-xA-X])",
        "ssss" => r"(\w{4})",
        "job" | "type" | "subtype" => r"(\w+)",
        _ => return None
    };
    Some(p)
}

/// quote a template literal for regex use, turning '?' into any-single and '*' into any-run
fn wildcard_quoted (literal: &str) -> String {
    let mut p = String::new();
    for c in literal.chars() {
        match c {
            '?' => p.push('.'),
            '*' => p.push_str(".*"),
            _ => p.push_str( &regex::escape(&c.to_string()))
        }
    }
    p
}
