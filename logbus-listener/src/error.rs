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

//! Provider-level failures.

use thiserror::Error;

/// Failure raised by a messaging provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A connection-factory or destination binding name did not resolve.
    #[error("unknown binding '{0}'")]
    UnknownBinding(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("credentials rejected for user '{0}'")]
    CredentialsRejected(String),

    #[error("subscribe to '{destination}' failed: {reason}")]
    Subscribe { destination: String, reason: String },

    /// The carried object of a message could not be decoded.
    #[error("cannot extract carried object: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("message of kind '{0}' does not carry an object")]
    NotAnObject(String),

    #[error("close failed: {0}")]
    Close(String),
}
