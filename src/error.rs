// Copyright (c) 2026 xnu-machtraps Authors.
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

//! Error types for the pipe transport and the analysis backend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("environment variable {0} is not set; run this tool from rizin with `#!pipe`")]
    NotInSession(&'static str),

    #[error("invalid pipe descriptor in {var}: {value:?}")]
    BadDescriptor { var: &'static str, value: String },

    #[error("failed to spawn {program}: {error}")]
    SpawnFailed { program: String, error: std::io::Error },

    #[error("pipe closed before the response terminator was received")]
    UnexpectedEof,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("`{command}` returned {output:?}, which is not a number")]
    NotANumber { command: String, output: String },

    #[error("`{command}` returned malformed JSON: {error}")]
    MalformedJson {
        command: String,
        error: serde_json::Error,
    },

    #[error("`{command}` returned an empty result")]
    EmptyResponse { command: String },
}
