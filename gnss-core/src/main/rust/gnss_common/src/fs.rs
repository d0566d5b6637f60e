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

use std::io;
use std::fs;
use std::io::{Read, Write};
use io::ErrorKind::*;
use std::fs::File;
use std::path::{Path,PathBuf};
use std::time::{Duration,SystemTime};

use crate::macros::io_error;

/// check if dir pathname exists and is writable, try to create dir (and parents) otherwise
pub fn ensure_writable_dir (dir: impl AsRef<Path>) -> io::Result<()> {
    let path = dir.as_ref();

    if path.is_dir() {
        let md = fs::metadata(&path)?;
        if md.permissions().readonly() {
            Err(io_error!(PermissionDenied, "dir {:?} not writable", &path))
        } else {
            Ok(())
        }

    } else {
        fs::create_dir_all(&path)
    }
}

pub fn filepath (dir: impl AsRef<Path>, filename: &str) -> PathBuf {
    let mut pb = PathBuf::new();
    pb.push(dir);
    pb.push(filename);
    pb
}

pub fn file_contents_as_string (path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut contents = String::with_capacity(len as usize);
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn set_file_contents (path: impl AsRef<Path>, new_contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(new_contents)
}

/// move a (fully written) file into place - the target never holds partial content
pub fn publish_file (tmp: impl AsRef<Path>, target: impl AsRef<Path>) -> io::Result<()> {
    if let Some(parent) = target.as_ref().parent() {
        ensure_writable_dir(parent)?;
    }
    fs::rename(tmp, target)
}

/// age of a file since last modification. Err if the file does not exist
pub fn file_age (path: impl AsRef<Path>) -> io::Result<Duration> {
    let mtime = fs::metadata(path)?.modified()?;
    SystemTime::now().duration_since(mtime).map_err(|e| io_error!(Other, "mtime in the future: {:?}", e))
}

pub fn remove_file_if_exists (path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    if path.is_file() {
        fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// remove the contents of a directory (not the directory itself)
pub fn clean_dir (dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    if dir.is_dir() {
        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}

pub fn file_length (path: impl AsRef<Path>) -> io::Result<u64> {
    let md = fs::metadata(path.as_ref())?;
    if md.is_file() {
        Ok(md.len())
    } else {
        Err(io_error!(NotFound, "not a file {:?}", path.as_ref()))
    }
}
