// Copyright 2025 DumbORB Authors
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

//! # DumbORB CLI
//!
//! Command-line driver for the DumbORB JSON-RPC bridge.
//!
//! The binary builds a demo bridge and dispatches call envelopes against it,
//! which makes it handy for poking at the wire format without a transport:
//!
//! - **hello**: `hello(bool)` answers "world" or fails on request
//! - **calc**: arithmetic with overloads on int, float and string
//! - **shape**: a bean class with overloaded constructors
//! - **counters**: hands out counters passed by callable reference
//!
//! ## Key Commands
//!
//! - `dumborb call`: Dispatch envelopes within one scope and print the responses
//! - `dumborb methods`: Print `system.listMethods`

pub mod demo;
