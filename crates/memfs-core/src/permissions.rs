// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owner/group/other permission evaluation

use crate::config::SecurityPolicy;
use crate::tree::Node;
use crate::{Access, Credentials};

/// Three-tier check: the owner bits apply to the owner, the group bits to
/// group members, the other bits to everybody else. Exactly one tier is
/// consulted per check.
pub fn mode_allows(mode: u32, uid: u32, gid: u32, caller: Credentials, access: Access) -> bool {
    let (r_bit, w_bit, x_bit) = if caller.uid == uid {
        (0o400, 0o200, 0o100)
    } else if caller.gid == gid {
        (0o040, 0o020, 0o010)
    } else {
        (0o004, 0o002, 0o001)
    };

    let bit = match access {
        Access::Read => r_bit,
        Access::Write => w_bit,
        Access::Execute => x_bit,
    };
    mode & bit != 0
}

pub(crate) fn allowed(
    policy: &SecurityPolicy,
    node: &Node,
    caller: Credentials,
    access: Access,
) -> bool {
    if !policy.enforce_permissions {
        return true;
    }
    if policy.root_bypass && caller.is_root() {
        return true;
    }
    mode_allows(node.mode, node.uid, node.gid, caller, access)
}
