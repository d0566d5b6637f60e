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

/// the compression registry - named codecs with filename suffix rules and invokable
/// command pipelines (gzip, unix compress, Hatanaka RINEX compression, ...).
///
/// A product's compression is a pipeline spec like "hatanaka+compress": stages in
/// application order. Converting between pipelines strips the common stage prefix,
/// undoes the remaining source stages in reverse and applies the remaining target
/// stages in order. Every stage runs out-of-place through a temp file; the result
/// only replaces the input after the stage command succeeded.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path,PathBuf};
use std::process::{Command,Stdio};

use log::debug;
use serde::{Serialize,Deserialize};
use tempfile::NamedTempFile;

use crate::errors::{GnssArchiveError,Result};

/// one named codec. Commands are external programs with `$in`/`$out` placeholders;
/// a command without `$out` writes the result to stdout.
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct CompressionType {
    pub name: String,

    #[serde(default)]
    pub compress: Option<String>,

    #[serde(default)]
    pub uncompress: Option<String>,

    /// filename suffix of the uncompressed form (e.g. "o" for RINEX obs)
    #[serde(default)]
    pub presuffix: String,

    /// filename suffix of the compressed form (e.g. ".gz", ".Z", "d")
    #[serde(default)]
    pub postsuffix: String
}

/// filename-suffix to pipeline-spec rule, most specific suffix wins
#[derive(Debug,Clone,Serialize,Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub compression: String
}

#[derive(Debug,Clone,Default)]
pub struct CompressionRegistry {
    types: HashMap<String,CompressionType>,
    suffix_rules: Vec<SuffixRule>
}

impl CompressionRegistry {
    pub fn new (types: Vec<CompressionType>, mut suffix_rules: Vec<SuffixRule>) -> Result<CompressionRegistry> {
        let mut map = HashMap::new();
        for ct in types {
            if map.insert( ct.name.clone(), ct).is_some() {
                return Err( GnssArchiveError::ConfigError("duplicate compression type".to_string()));
            }
        }

        suffix_rules.sort_by( |a,b| b.suffix.len().cmp(&a.suffix.len())); // longest suffix first

        let registry = CompressionRegistry { types: map, suffix_rules };
        for rule in &registry.suffix_rules {
            registry.pipeline(&rule.compression)?; // all referenced codecs must exist
        }
        Ok(registry)
    }

    pub fn get (&self, name: &str) -> Result<&CompressionType> {
        self.types.get(name)
            .ok_or_else(|| GnssArchiveError::ConfigError( format!("unknown compression '{}'", name)))
    }

    /// parse a pipeline spec ("hatanaka+compress", "gzip", "none", "") into codec stages
    pub fn pipeline (&self, spec: &str) -> Result<Vec<&CompressionType>> {
        let spec = spec.trim();
        if spec.is_empty() || spec == "none" {
            return Ok(Vec::new());
        }
        spec.split('+').map( |name| self.get(name.trim())).collect()
    }

    /// pipeline spec inferred from a filename suffix, if any rule matches
    pub fn infer_from_suffix<'a> (&'a self, filename: &str) -> Option<&'a str> {
        self.suffix_rules.iter()
            .find( |rule| filename.ends_with(&rule.suffix))
            .map( |rule| rule.compression.as_str())
    }

    /// the filename a conversion produces, by suffix surgery per stage
    pub fn converted_filename (&self, filename: &str, from: &str, to: &str) -> Result<String> {
        let from_stages = self.pipeline(from)?;
        let to_stages = self.pipeline(to)?;
        let common = common_prefix_len(&from_stages, &to_stages);

        let mut name = filename.to_string();
        for stage in from_stages[common..].iter().rev() {
            name = strip_suffix(&name, &stage.postsuffix, &stage.presuffix);
        }
        for stage in &to_stages[common..] {
            name = strip_suffix(&name, &stage.presuffix, &stage.postsuffix);
        }
        Ok(name)
    }

    /// convert a local file between pipeline specs. Returns the converted file path
    /// (inside tmp_dir); the input file is left in place if any stage fails.
    pub fn convert (&self, file: &Path, from: &str, to: &str, tmp_dir: &Path) -> Result<PathBuf> {
        let from_stages = self.pipeline(from)?;
        let to_stages = self.pipeline(to)?;
        let common = common_prefix_len(&from_stages, &to_stages);

        if from_stages.len() == common && to_stages.len() == common {
            return Ok(file.to_path_buf()); // nothing to do
        }

        let mut commands = Vec::new();
        for stage in from_stages[common..].iter().rev() {
            commands.push( stage.uncompress.as_deref()
                .ok_or_else(|| GnssArchiveError::CompressionError( format!("codec '{}' cannot uncompress", stage.name)))?);
        }
        for stage in &to_stages[common..] {
            commands.push( stage.compress.as_deref()
                .ok_or_else(|| GnssArchiveError::CompressionError( format!("codec '{}' cannot compress", stage.name)))?);
        }

        // intermediates of earlier stages are removed as soon as the next stage is done
        let mut current = file.to_path_buf();
        for cmd in commands {
            let result = run_stage(cmd, &current, tmp_dir);
            if current != *file {
                let _ = std::fs::remove_file(&current);
            }
            current = result?;
        }
        Ok(current)
    }
}

fn common_prefix_len (a: &[&CompressionType], b: &[&CompressionType]) -> usize {
    let mut n = 0;
    while n < a.len() && n < b.len() && a[n].name == b[n].name { n += 1; }
    n
}

/// replace a trailing `old` suffix with `new`. A missing old suffix just appends
fn strip_suffix (name: &str, old: &str, new: &str) -> String {
    let base = if !old.is_empty() && name.ends_with(old) {
        &name[..name.len()-old.len()]
    } else {
        name
    };
    format!("{}{}", base, new)
}

/// run one codec stage out-of-place: $in/$out substituted into the command argv,
/// stdout captured into the output file if the command does not take $out
fn run_stage (cmd: &str, input: &Path, tmp_dir: &Path) -> Result<PathBuf> {
    let out = NamedTempFile::new_in(tmp_dir)?;
    let out_path = out.path().to_path_buf();

    let mut argv: Vec<String> = Vec::new();
    let mut uses_out = false;
    for word in cmd.split_whitespace() {
        let word = word.replace("$in", &input.to_string_lossy());
        if word.contains("$out") {
            uses_out = true;
            argv.push( word.replace("$out", &out_path.to_string_lossy()));
        } else {
            argv.push(word);
        }
    }
    if argv.is_empty() {
        return Err( GnssArchiveError::CompressionError("empty codec command".to_string()));
    }

    debug!("running codec stage: {:?}", argv);

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    if !uses_out {
        command.stdout( Stdio::from( File::create(&out_path)?));
    }

    let status = command.status()
        .map_err(|e| GnssArchiveError::CompressionError( format!("cannot run '{}': {}", argv[0], e)))?;
    if !status.success() {
        return Err( GnssArchiveError::CompressionError( format!("'{}' failed with {}", argv[0], status)));
    }

    let (_f, kept) = out.keep()
        .map_err(|e| GnssArchiveError::CompressionError( format!("cannot keep stage output: {}", e)))?;
    Ok(kept)
}
