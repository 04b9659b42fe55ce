// Copyright 2025 Hyrax Contributors
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

//! Version information for Hyrax

/// Major version number
pub const MAJOR: u32 = 0;

/// Minor version number
pub const MINOR: u32 = 1;

/// Patch version number
pub const PATCH: u32 = 0;

/// Git commit hash at build time
/// Set via HYRAX_GIT_COMMIT environment variable during compilation
pub const GIT_COMMIT: &str = match option_env!("HYRAX_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Returns the version string in semver format
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns version info as a formatted string
pub fn version_info() -> String {
    format!("hyrax {} (commit: {})", version(), GIT_COMMIT)
}
