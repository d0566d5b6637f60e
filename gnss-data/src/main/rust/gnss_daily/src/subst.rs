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

/// scheduler variable substitution: `${var}`, `${var+N}` day offsets on date
/// variables, the `${var?then:else}` conditional, and `for N1 to N2 [step S]
/// [if exists] [need K] <item>` list expansion. Expansion is iterative with a
/// bounded depth, so definition cycles are detected and refused.

use std::collections::HashMap;

use chrono::{DateTime,Datelike,Duration,Timelike,Utc};

use gnss_common::datetime::{day_of_year,gps_week,gps_week_day};
use crate::errors::{GnssDailyError,Result,subst_error};

const MAX_DEPTH: usize = 10;

/// variables available during expansion: the processing date plus configured values
#[derive(Debug,Clone)]
pub struct VarContext {
    pub date: DateTime<Utc>,
    pub vars: HashMap<String,String>
}

impl VarContext {
    pub fn new (date: DateTime<Utc>, vars: HashMap<String,String>) -> VarContext {
        VarContext { date, vars }
    }

    fn date_field (&self, name: &str, offset_days: i64) -> Option<String> {
        let t = self.date + Duration::days(offset_days);
        let v = match name {
            "yyyy" => format!("{:04}", t.year()),
            "yy"   => format!("{:02}", t.year().rem_euclid(100)),
            "mm"   => format!("{:02}", t.month()),
            "dd"   => format!("{:02}", t.day()),
            "ddd"  => format!("{:03}", day_of_year(&t)),
            "wwww" => format!("{:04}", gps_week(&t)),
            "ww"   => format!("{:02}", gps_week(&t).rem_euclid(100)),
            "d"    => format!("{}", gps_week_day(&t)),
            _ => return None
        };
        Some(v)
    }

    /// value of one `${...}` body: conditional, date field with offset, or plain var
    fn lookup (&self, body: &str) -> Result<String> {
        if let Some((var, branches)) = body.split_once('?') {
            let (then_val, else_val) = branches.split_once(':')
                .ok_or_else(|| subst_error( format!("conditional '{}' has no ':'", body)))?;
            let tested = self.lookup_plain(var).unwrap_or_default();
            return Ok( if tested.is_empty() { else_val.to_string() } else { then_val.to_string() });
        }

        let (name, offset) = split_offset(body)?;
        if let Some(v) = self.date_field(name, offset) {
            return Ok(v);
        }
        if offset != 0 {
            return Err( subst_error( format!("day offset on non-date variable '{}'", name)));
        }
        self.lookup_plain(name)
            .ok_or_else(|| subst_error( format!("undefined variable '{}'", name)))
    }

    fn lookup_plain (&self, name: &str) -> Option<String> {
        self.date_field(name, 0).or_else(|| self.vars.get(name).cloned())
    }
}

fn split_offset (body: &str) -> Result<(&str,i64)> {
    match body.find( |c| c == '+' || c == '-') {
        Some(k) => {
            let offs: i64 = body[k..].parse()
                .map_err(|_| subst_error( format!("bad day offset in '{}'", body)))?;
            Ok( (&body[..k], offs))
        }
        None => Ok( (body, 0))
    }
}

/// one substitution pass; Ok(None) when nothing was left to substitute
fn expand_once (s: &str, ctx: &VarContext) -> Result<Option<String>> {
    if !s.contains("${") {
        return Ok(None);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find("${") {
        out.push_str(&rest[..i]);
        let after = &rest[i+2..];
        let j = after.find('}')
            .ok_or_else(|| subst_error( format!("unterminated reference in '{}'", s)))?;
        out.push_str( &ctx.lookup(&after[..j])?);
        rest = &after[j+1..];
    }
    out.push_str(rest);
    Ok( Some(out))
}

/// expand a value until no references remain. Refuses after MAX_DEPTH passes,
/// which catches definition cycles (a -> b -> a)
pub fn expand (s: &str, ctx: &VarContext) -> Result<String> {
    let mut current = s.to_string();
    for _ in 0..MAX_DEPTH {
        match expand_once(&current, ctx)? {
            Some(next) => current = next,
            None => return Ok(current)
        }
    }
    Err( subst_error( format!("expansion of '{}' does not terminate (cycle?)", s)))
}

/// a parsed `for N1 to N2 [step S] [if exists] [need K] <item>` list spec
#[derive(Debug,PartialEq)]
pub struct ForSpec<'a> {
    pub from: i64,
    pub to: i64,
    pub step: i64,
    pub if_exists: bool,
    pub need: usize,
    pub item: &'a str
}

/// whitespace token cursor that can hand back the unconsumed remainder
struct Tokens<'a> {
    rest: &'a str
}

impl<'a> Tokens<'a> {
    fn new (s: &'a str) -> Tokens<'a> { Tokens { rest: s.trim_start() } }

    fn peek (&self) -> Option<&'a str> {
        self.rest.split_whitespace().next()
    }

    fn peek2 (&self) -> Option<&'a str> {
        self.rest.split_whitespace().nth(1)
    }

    fn next (&mut self) -> Option<&'a str> {
        let tok = self.peek()?;
        self.rest = self.rest.trim_start()[tok.len()..].trim_start();
        Some(tok)
    }

    fn int (&mut self) -> Result<i64> {
        self.next().and_then(|w| w.parse().ok())
            .ok_or_else(|| subst_error( format!("expected a number before '{}'", self.rest)))
    }

    fn expect (&mut self, word: &str) -> Result<()> {
        if self.next() == Some(word) {
            Ok(())
        } else {
            Err( subst_error( format!("expected '{}' before '{}'", word, self.rest)))
        }
    }
}

/// parse the literal form, None if the value is not a for-list
pub fn parse_for_spec (value: &str) -> Result<Option<ForSpec>> {
    let trimmed = value.trim_start();
    if !trimmed.starts_with("for ") {
        return Ok(None);
    }

    let mut toks = Tokens::new(trimmed);
    toks.expect("for")?;
    let from = toks.int()?;
    toks.expect("to")?;
    let to = toks.int()?;

    let mut step = 1i64;
    let mut if_exists = false;
    let mut need = 0usize;

    loop {
        match toks.peek() {
            Some("step") => { toks.next(); step = toks.int()?; }
            Some("if") if toks.peek2() == Some("exists") => { toks.next(); toks.next(); if_exists = true; }
            Some("need") => { toks.next(); need = toks.int()? as usize; }
            _ => break
        }
    }

    if step == 0 {
        return Err( subst_error( format!("zero step in '{}'", value)));
    }

    let item = toks.rest;
    if item.is_empty() {
        return Err( subst_error( format!("for-list '{}' has no item template", value)));
    }

    Ok( Some( ForSpec { from, to, step, if_exists, need, item }))
}

/// expand a for-list to its space-separated values. The item template is
/// re-evaluated per day offset; `if exists` filters through the given predicate,
/// `need K` requires at least K surviving values
pub fn expand_for_list (spec: &ForSpec, ctx: &VarContext,
                        exists: &mut dyn FnMut(&str) -> bool) -> Result<String> {
    let mut values = Vec::new();

    let mut i = spec.from;
    while (spec.step > 0 && i <= spec.to) || (spec.step < 0 && i >= spec.to) {
        let day_ctx = VarContext { date: ctx.date + Duration::days(i), vars: ctx.vars.clone() };
        let value = expand(spec.item, &day_ctx)?;
        if !spec.if_exists || exists(&value) {
            values.push(value);
        }
        i += spec.step;
    }

    if values.len() < spec.need {
        return Err( subst_error(
            format!("for-list needs {} values, only {} available", spec.need, values.len())));
    }
    Ok( values.join(" "))
}
