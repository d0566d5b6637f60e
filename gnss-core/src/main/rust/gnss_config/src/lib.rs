#![allow(unused)]

//! typed configuration support for the GNSS acquisition crates: RON config files,
//! environment overrides and archive credentials. The free-form config surface is
//! validated into strongly typed structs once at startup - nothing in the core
//! re-reads configuration after that.

pub mod errors;
use crate::errors::{GnssConfigError,ConfigResult,config_error};

use std::{path::{Path,PathBuf}, fs::File, io::{Read, Write}, env, time::Duration};
use ron;
use serde::{
    Deserialize,Serialize,
    de::DeserializeOwned
};

/// environment variables that override curated config values
pub const ENV_CACHE_DIR: &str    = "GNSS_CACHE_DIR";
pub const ENV_TMP_DIR: &str      = "GNSS_TMP_DIR";
pub const ENV_CONFIG_FILE: &str  = "GNSS_CONFIG";
pub const ENV_DEBUG: &str        = "GNSS_DEBUG";
pub const ENV_CREDENTIALS: &str  = "GNSS_CREDENTIALS";

pub fn load_config <C:DeserializeOwned> (pathname: impl AsRef<Path>) -> ConfigResult<C> {
    let path = pathname.as_ref();
    if !path.is_file() {
        Err( GnssConfigError::ConfigFileNotFound(path.as_os_str().to_string_lossy().to_string()) )
    } else {
        let mut file = File::open(path)?;

        let len = file.metadata()?.len();
        let mut contents = String::with_capacity(len as usize);
        file.read_to_string(&mut contents)?;

        ron::from_str::<C>(contents.as_str()).map_err(|e| GnssConfigError::ConfigParseError(format!("{:?}", e)))
    }
}

pub fn store_config <S: Serialize> (conf: &S, pathname: impl AsRef<Path>) -> ConfigResult<String> {
    let mut pretty_config = ron::ser::PrettyConfig::default();
    pretty_config.struct_names = true;
    pretty_config.compact_arrays = true;

    let serialized = ron::ser::to_string_pretty(conf, pretty_config)?;

    let path = pathname.as_ref();
    let mut file = std::fs::File::create(path)?;
    file.write_all(serialized.as_bytes())?;

    Ok(path.as_os_str().to_string_lossy().to_string())
}

/// value of an override environment variable, or the configured default
pub fn env_or (var: &str, configured: &str) -> String {
    env::var(var).unwrap_or_else(|_| configured.to_string())
}

//--- environment references

/// expand `${VAR}` and `${VAR1|VAR2||default}` references in a str.
/// Alternatives are tried in order, the part after `||` is the fallback if none is set.
/// Fails if a reference has neither a set variable nor a default.
pub fn expand_env_refs (s: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(i) = rest.find("${") {
        result.push_str(&rest[..i]);
        let after = &rest[i+2..];
        let j = after.find('}').ok_or_else(|| GnssConfigError::ConfigParseError(format!("unterminated env reference in '{}'", s)))?;
        let spec = &after[..j];
        result.push_str( &lookup_env_ref(spec)?);
        rest = &after[j+1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn lookup_env_ref (spec: &str) -> ConfigResult<String> {
    let (chain, default) = match spec.split_once("||") {
        Some((c,d)) => (c, Some(d)),
        None => (spec, None)
    };

    for var in chain.split('|') {
        let var = var.trim();
        if !var.is_empty() {
            if let Ok(v) = env::var(var) {
                return Ok(v);
            }
        }
    }

    match default {
        Some(d) => Ok(d.to_string()),
        None => Err( GnssConfigError::EnvRefError(spec.to_string()))
    }
}

//--- archive credentials

/// username/password pair for archives that require a login.
/// May be given inline in the archive definition, in a referenced file
/// (JSON `{"username":..,"password":..}` or `user X` / `password Y` lines),
/// or through `<NAME>_USER` / `<NAME>_PASSWORD` environment variables.
#[derive(Debug,Clone,Serialize,Deserialize,PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String
}

impl Credentials {
    pub fn from_file (pathname: impl AsRef<Path>) -> ConfigResult<Credentials> {
        let path = pathname.as_ref();
        let contents = gnss_common::fs::file_contents_as_string(path)?;
        let trimmed = contents.trim();

        if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
                .map_err(|e| GnssConfigError::CredentialsError(format!("{:?}: {:?}", path, e)))
        } else {
            Self::from_lines(trimmed)
                .ok_or_else(|| GnssConfigError::CredentialsError(format!("no user/password lines in {:?}", path)))
        }
    }

    fn from_lines (contents: &str) -> Option<Credentials> {
        let mut username: Option<String> = None;
        let mut password: Option<String> = None;

        for line in contents.lines() {
            let line = line.trim();
            if let Some(v) = line.strip_prefix("user ") {
                username = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("password ") {
                password = Some(v.trim().to_string());
            }
        }
        Some( Credentials { username: username?, password: password? })
    }

    pub fn from_env (name: &str) -> Option<Credentials> {
        let prefix = name.to_uppercase().replace('-', "_");
        let username = env::var(format!("{}_USER", prefix)).ok()?;
        let password = env::var(format!("{}_PASSWORD", prefix)).ok()?;
        Some( Credentials { username, password })
    }
}
