// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared by `dispatch-storage`, `dispatch-engine`, and
//! `dispatch-adapters` test code.

use crate::ids::{IssueId, IssueIdentifier};
use crate::model::{ActiveDispatchDraft, Tier};

crate::builder! {
    pub struct ActiveDispatchDraftBuilder => ActiveDispatchDraft {
        into {
            issue_identifier: IssueIdentifier = "CT-100",
            branch: String = "feature/ct-100",
            worktree_path: String = "/workspace/ct-100",
            model: String = "test-model",
        }
        set {
            tier: Tier = Tier::Junior,
        }
        option {
            project: String = None,
        }
        computed {
            issue_id: IssueId = IssueId::new("issue-ct-100"),
        }
    }
}
