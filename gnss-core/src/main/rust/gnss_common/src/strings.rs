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

use std::fmt;
use std::fmt::{Display,Write};

/// stringify iterator for Display elements with given delimiter without per-element allocation
pub fn mk_string<T: Display> (it: std::slice::Iter<'_,T>, delim: &str) -> Result<String,fmt::Error> {
    let mut s = String::new();

    for e in it {
        if !s.is_empty() { s.push_str(delim); }
        write!(s,"{}",e)?
    }
    Ok(s)
}

/// does a str have mixed lower and upper case chars
pub fn is_mixed_case (s:&str) -> bool {
    let mut has_upper = false;
    let mut has_lower = false;

    for s in s.chars() {
        if s.is_uppercase() {
            if has_lower { return true; }
            has_upper = true;
        } else if s.is_lowercase() {
            if has_upper { return true; }
            has_lower = true;
        }
    }
    false
}

/// is every cased char of a str uppercase
pub fn is_all_uppercase (s: &str) -> bool {
    !s.chars().any(|c| c.is_lowercase())
}
