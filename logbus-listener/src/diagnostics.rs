// Copyright 2025 The Logbus Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Write-only diagnostics stream used for discarded messages and swallowed failures.

use std::error::Error;

use log::{error, warn};

/// Destination for listener diagnostics.
pub trait Diagnostics: Send + Sync {
    fn warn(&self, message: &str);

    fn failure(&self, err: &dyn Error);
}

/// [`Diagnostics`] backed by the `log` facade.
#[derive(Debug, Clone)]
pub struct LogDiagnostics {
    id: String,
}

impl LogDiagnostics {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Diagnostics for LogDiagnostics {
    fn warn(&self, message: &str) {
        warn!("[{}] {message}", self.id);
    }

    fn failure(&self, err: &dyn Error) {
        error!("[{}] {err}", self.id);
    }
}
