// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Names of synthesized types, fields and labels.
//!
//! Every synthesized name contains `$`, which user identifiers can't, so
//! they never collide with user members.

use coro_ast::SynthesizedKind;

pub const STATE_FIELD: &str = "$state";
pub const BUILDER_FIELD: &str = "$builder";
pub const CURRENT_FIELD: &str = "$current";
pub const DISPOSING_FIELD: &str = "$disposing";
pub const THIS_PROXY: &str = "$this";

pub const MOVE_NEXT: &str = "MoveNext";
pub const MOVE_NEXT_ASYNC: &str = "MoveNextAsync";
pub const DISPOSE: &str = "Dispose";

pub fn container_name(method: &str, ordinal: u32) -> String {
    format!("{}$sm{}", method, ordinal)
}

pub fn param_proxy(name: &str) -> String {
    format!("${}", name)
}

/// Field pinned to a slot for the life of the machine: `x$h3` for user
/// locals, `$s3` (kind tag + slot) for synthesized ones.
pub fn hoisted_field(name: Option<&str>, kind: SynthesizedKind, slot: i32) -> String {
    format!("{}${}{}", name.unwrap_or(""), kind.tag(), slot)
}

/// Field from the reuse pool. Keeps the user's name when it has one so a
/// debugger can still show it.
pub fn reusable_field(name: Option<&str>, ordinal: u32) -> String {
    format!("{}$r{}", name.unwrap_or(""), ordinal)
}

pub fn awaiter_field(slot: i32) -> String {
    format!("$awaiter{}", slot)
}
