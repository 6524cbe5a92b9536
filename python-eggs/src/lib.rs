// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Python egg distributions implemented in Rust.

This crate discovers installed Python distributions in a directory without
consulting any central database, indexes them by normalized project name and
answers "best distribution for this requirement" queries.

The identity primitives live in [name], [version], [specifier] and
[requirement]. [distribution::Distribution] is a located, loadable unit of
metadata. [filesystem_scanning] turns a directory into a lazy stream of
distributions and [environment::Environment] indexes them.

[wheel::WheelArchive] converts a downloaded wheel into the unpacked `.egg`
layout consumed by build tooling.
*/

pub mod distribution;
pub mod environment;
pub mod error;
pub mod filesystem_scanning;
pub mod name;
pub mod package_metadata;
pub mod requirement;
pub mod specifier;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod version;
pub mod wheel;
pub mod wheel_builder;
