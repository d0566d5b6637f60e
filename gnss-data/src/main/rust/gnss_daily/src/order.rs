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

use chrono::{DateTime,Duration,Utc};
use rand::seq::SliceRandom;
use serde::{Serialize,Deserialize};

/// traversal order over the configured date range
#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize,Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOrder {
    Forwards,
    #[default]
    Backwards,
    Random,
    /// reverse-bit-order traversal of the day offsets - fast uniform temporal coverage
    BinaryFill
}

/// the day offsets of [start,end] stepped by `increment`, arranged per order
pub fn day_offsets (n_days: usize, order: ProcessingOrder, increment: usize) -> Vec<usize> {
    let increment = increment.max(1);
    let mut offsets: Vec<usize> = (0..n_days).step_by(increment).collect();

    match order {
        ProcessingOrder::Forwards => offsets,
        ProcessingOrder::Backwards => { offsets.reverse(); offsets }
        ProcessingOrder::Random => {
            offsets.shuffle( &mut rand::thread_rng());
            offsets
        }
        ProcessingOrder::BinaryFill => binary_fill(offsets)
    }
}

/// reorder by bit-reversed index: 0, n/2, n/4, 3n/4, ... so early visits spread
/// evenly over the whole range
fn binary_fill (offsets: Vec<usize>) -> Vec<usize> {
    let n = offsets.len();
    if n < 2 { return offsets; }

    let bits = usize::BITS - (n - 1).leading_zeros();
    let mut out = Vec::with_capacity(n);

    for i in 0..(1usize << bits) {
        let rev = reverse_bits(i, bits);
        if rev < n {
            out.push( offsets[rev]);
        }
    }
    out
}

fn reverse_bits (i: usize, bits: u32) -> usize {
    let mut rev = 0usize;
    for b in 0..bits {
        if i & (1 << b) != 0 {
            rev |= 1 << (bits - 1 - b);
        }
    }
    rev
}

/// concrete visit dates for a range (both ends inclusive)
pub fn visit_dates (start: &DateTime<Utc>, end: &DateTime<Utc>,
                    order: ProcessingOrder, increment: usize) -> Vec<DateTime<Utc>> {
    if end < start {
        return Vec::new();
    }
    let n_days = (*end - *start).num_days() as usize + 1;
    day_offsets(n_days, order, increment).iter()
        .map( |offs| *start + Duration::days(*offs as i64))
        .collect()
}
