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

use chrono::{DateTime,Utc,NaiveDate,NaiveTime,NaiveDateTime,Datelike,Timelike,TimeZone,Duration};
use serde::{Serialize,Deserialize,Serializer,Deserializer};
use parse_duration::parse;

/// the reference epoch for all cadence arithmetic: begin of GPS time
/// (1980-01-06 00:00:00 UTC, a Sunday - which also anchors weekly buckets on GPS weeks)
pub fn gnss_epoch () -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1980, 1, 6, 0, 0, 0).unwrap() // valid y/m/d h:m:s can't fail
}

/// seconds since the GNSS reference epoch (negative before 1980-01-06)
pub fn epoch_seconds (dt: &DateTime<Utc>) -> i64 {
    (*dt - gnss_epoch()).num_seconds()
}

/// GPS week number of given datetime
pub fn gps_week (dt: &DateTime<Utc>) -> i64 {
    epoch_seconds(dt).div_euclid(7 * 86400)
}

/// GPS day-of-week 0..6 with 0 = Sunday
pub fn gps_week_day (dt: &DateTime<Utc>) -> u32 {
    (epoch_seconds(dt).div_euclid(86400).rem_euclid(7)) as u32
}

/// day of year 1..366
pub fn day_of_year (dt: &DateTime<Utc>) -> u32 {
    dt.ordinal()
}

/// session letter 'a'..'x' for hours 00..23 (RINEX hourly file convention)
pub fn hour_letter (hour: u32) -> char {
    char::from_u32('a' as u32 + (hour % 24)).unwrap() // 'a'+23 is always a char
}

/// inverse of [`hour_letter`]
pub fn hour_of_letter (c: char) -> Option<u32> {
    let c = c.to_ascii_lowercase();
    if ('a'..='x').contains(&c) { Some(c as u32 - 'a' as u32) } else { None }
}

//--- cadence bucket arithmetic

/// canonical bucket start for timestamp t and bucket length `step`:
/// floor((t - E0)/step)*step + E0
pub fn floor_time (t: &DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_secs = step.num_seconds();
    let secs = epoch_seconds(t).div_euclid(step_secs) * step_secs;
    gnss_epoch() + Duration::seconds(secs)
}

/// earliest bucket boundary >= t
pub fn ceil_time (t: &DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let fl = floor_time(t, step);
    if fl == *t { fl } else { fl + step }
}

/// ordered bucket starts whose [bucket,bucket+step) interval intersects [start,end]
pub fn time_buckets (start: &DateTime<Utc>, end: &DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    let mut buckets = Vec::new();
    if end >= start {
        let mut t = floor_time(start, step);
        while t <= *end {
            buckets.push(t);
            t += step;
        }
    }
    buckets
}

//--- date parsing

/// parse a UTC date in one of the forms the processing scripts use:
/// "yyyy-mm-dd", "yyyy/ddd" (day of year) or "wwww/d" (GPS week / week day)
pub fn parse_gnss_date (s: &str) -> Option<DateTime<Utc>> {
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(naive_utc_date_to_utc_datetime(nd));
    }

    if let Some((a,b)) = s.split_once('/') {
        if let (Ok(x),Ok(y)) = (a.parse::<i64>(), b.parse::<i64>()) {
            // a 2+ digit second field is a day-of-year, a single digit 0..6 a GPS week day
            if b.len() >= 2 && x >= 1980 && (1..=366).contains(&y) { // yyyy/ddd
                return NaiveDate::from_yo_opt(x as i32, y as u32).map(naive_utc_date_to_utc_datetime);
            }
            if b.len() == 1 && (0..=6).contains(&y) { // wwww/d
                return Some(gnss_epoch() + Duration::days(x*7 + y));
            }
        }
    }
    None
}

/// get a DateTime<Utc> from a NaiveDate that is supposed to be in Utc
pub fn naive_utc_date_to_utc_datetime (nd: NaiveDate) -> DateTime<Utc> {
    let nt = NaiveTime::from_hms_opt(0, 0, 0).unwrap(); // 00:00:00 can't fail
    let ndt = NaiveDateTime::new(nd,nt);

    DateTime::from_naive_utc_and_offset(ndt,Utc)
}

/// whole days between two datetimes (truncating)
pub fn days_between (from: &DateTime<Utc>, to: &DateTime<Utc>) -> i64 {
    (*to - *from).num_days()
}

//--- support for serde

pub fn deserialize_duration <'a,D>(deserializer: D) -> Result<std::time::Duration,D::Error>
    where D: Deserializer<'a>
{
    String::deserialize(deserializer).and_then( |string| {
        parse(string.as_str())
            .map_err( |e| serde::de::Error::custom(format!("{:?}",e)))
    })
}

pub fn serialize_duration<S: Serializer> (dur: &std::time::Duration, s: S) -> Result<S::Ok, S::Error>  {
    let dfm = format!("{:?}", dur);
    s.serialize_str(&dfm)
}

pub fn deserialize_opt_duration <'a,D>(deserializer: D) -> Result<Option<std::time::Duration>,D::Error>
    where D: Deserializer<'a>
{
    Option::<String>::deserialize(deserializer).and_then( |opt| match opt {
        Some(string) => parse(string.as_str())
            .map( |d| Some(d))
            .map_err( |e| serde::de::Error::custom(format!("{:?}",e))),
        None => Ok(None)
    })
}

pub fn serialize_opt_duration<S: Serializer> (dur: &Option<std::time::Duration>, s: S) -> Result<S::Ok, S::Error>  {
    match dur {
        Some(d) => s.serialize_some(&format!("{:?}", d)),
        None => s.serialize_none()
    }
}
