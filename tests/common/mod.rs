//! Scripted stand-ins for model providers and the sandbox runner

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cody::router::{ChatProvider, ModelRequest};
use cody::sandbox::{CodeRunner, ExecOutput, SandboxPolicy, SandboxResult};

/// Provider that answers from a script; an exhausted script means "no reply"
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Option<String>>>,
    pub calls: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn absent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_replies(replies: &[Option<&str>]) -> Arc<Self> {
        let provider = Self::default();
        provider
            .replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| r.map(String::from)));
        Arc::new(provider)
    }

    pub fn always(reply: &str) -> Arc<Self> {
        Self::with_replies(&vec![Some(reply); 32])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|r| r.prompt.clone())
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, request: &ModelRequest) -> Option<String> {
        self.calls.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front().flatten()
    }
}

/// Runner that returns a fixed result and records the code it was given
pub struct FakeRunner {
    result: SandboxResult,
    pub codes: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new(result: SandboxResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            codes: Mutex::new(Vec::new()),
        })
    }

    pub fn printing(stdout: &str) -> Arc<Self> {
        Self::new(SandboxResult::Completed(ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }))
    }
}

#[async_trait]
impl CodeRunner for FakeRunner {
    async fn run(&self, code: &str, _policy: &SandboxPolicy) -> SandboxResult {
        self.codes.lock().unwrap().push(code.to_string());
        self.result.clone()
    }
}
