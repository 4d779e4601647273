// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pipeline definition files and validation

mod parser;
mod schema;
mod validate;

pub use parser::{load_pipeline, parse_pipeline, ParseError};
pub use schema::{check_step, SchemaError};
pub use validate::{stage_backend, validate, ValidationError};
