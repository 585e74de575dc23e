// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PromptBuilder` fake. Prompt-template rendering is out of scope for the
//! core (§1); this renders a deterministic, inspectable string so pipeline
//! tests can assert which section/vars were requested without caring about
//! actual prompt wording.

#![cfg(any(test, feature = "test-support"))]

use dispatch_core::{PromptBuilder, PromptSection, PromptVars};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub section: PromptSection,
    pub vars: PromptVars,
}

#[derive(Clone, Default)]
pub struct FakePromptBuilder {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl FakePromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }
}

impl PromptBuilder for FakePromptBuilder {
    fn render(&self, section: PromptSection, vars: &PromptVars) -> String {
        self.calls.lock().push(RenderCall {
            section,
            vars: vars.clone(),
        });
        format!(
            "[{section}] {} attempt={} gaps={:?}",
            vars.identifier, vars.attempt, vars.gaps
        )
    }
}
