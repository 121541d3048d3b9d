/*
 Prod
 Copyright 2021-2024 Peter Pearson.
 Licensed under the Apache License, Version 2.0 (the "License");
 You may not use this file except in compliance with the License.
 You may obtain a copy of the License at
 http://www.apache.org/licenses/LICENSE-2.0
 Unless required by applicable law or agreed to in writing, software
 distributed under the License is distributed on an "AS IS" BASIS,
 WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 See the License for the specific language governing permissions and
 limitations under the License.
 ---------
*/

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

// 30 minutes at the default interval
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 360;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How often, and how many times, to re-check a node that isn't active yet.
#[derive(Clone, Debug, PartialEq)]
#[derive(Copy)]
pub struct PollPolicy {
    pub interval:     Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> PollPolicy {
        PollPolicy { interval, max_attempts }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy { interval: DEFAULT_POLL_INTERVAL, max_attempts: DEFAULT_MAX_POLL_ATTEMPTS }
    }
}
