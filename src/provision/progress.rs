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

use std::io::Write;

use tracing::warn;

/// Receives human-readable progress text. Fragments are not necessarily whole
/// lines: a line can be built up over several calls before its '\n' arrives.
pub trait ProgressSink {
    fn emit(&mut self, fragment: &str);
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&mut self, _fragment: &str) {
    }
}

impl ProgressSink for String {
    fn emit(&mut self, fragment: &str) {
        self.push_str(fragment);
    }
}

/// Forwards progress to any `Write` (e.g. `std::io::stderr()`), flushing after
/// each fragment so partial lines show up straight away.
pub struct WriterProgress<W: Write> {
    writer: W,
}

impl<W: Write> WriterProgress<W> {
    pub fn new(writer: W) -> WriterProgress<W> {
        WriterProgress { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ProgressSink for WriterProgress<W> {
    fn emit(&mut self, fragment: &str) {
        // progress output failing shouldn't abort provisioning
        if let Err(e) = self.writer.write_all(fragment.as_bytes()).and_then(|_| self.writer.flush()) {
            warn!("failed to write progress output: {}", e);
        }
    }
}
