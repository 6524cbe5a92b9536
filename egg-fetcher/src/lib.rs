// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Fetch Python packages needed at build time as unpacked eggs.

Given a [python_eggs::requirement::Requirement], [fetch::EggFetcher] returns a
distribution from an eggs directory, downloading a wheel with pip and
converting it to an egg when nothing installed satisfies the requirement.
*/

pub mod downloader;
pub mod error;
pub mod fetch;
pub mod settings;
