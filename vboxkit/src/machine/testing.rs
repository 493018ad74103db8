//! Scripted command runner for facade tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use vboxkit_shared::errors::VboxResult;

use crate::invoker::{CommandLine, CommandResult, CommandRunner, RunOptions, TIMEOUT_EXIT_CODE};

struct Reply {
    exit_code: i32,
    stdout: String,
    stderr: String,
    timed_out: bool,
}

struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

/// Answers commands from canned replies instead of spawning processes.
///
/// The first rule whose needle occurs in the joined command line answers.
/// A rule with several replies hands them out in order and then keeps
/// repeating the last one. Unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, needle: &str, stdout: &str) {
        self.push(needle, 0, stdout, "", false);
    }

    pub(crate) fn fail(&self, needle: &str, exit_code: i32, stderr: &str) {
        self.push(needle, exit_code, "", stderr, false);
    }

    /// Answer as if the deadline expired and the child was killed.
    pub(crate) fn time_out(&self, needle: &str) {
        self.push(needle, TIMEOUT_EXIT_CODE, "", "command timed out", true);
    }

    fn push(&self, needle: &str, exit_code: i32, stdout: &str, stderr: &str, timed_out: bool) {
        let reply = Reply {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out,
        };
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|r| r.needle == needle) {
            Some(rule) => rule.replies.push_back(reply),
            None => rules.push(Rule {
                needle: needle.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
    }

    /// Every command line seen so far, argv joined by spaces.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_matching(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine, options: RunOptions) -> VboxResult<CommandResult> {
        let arguments = command.arguments();
        let joined = arguments.join(" ");
        self.calls.lock().push(joined.clone());

        let (exit_code, stdout, stderr, timed_out) = {
            let mut rules = self.rules.lock();
            match rules.iter_mut().find(|r| joined.contains(&r.needle)) {
                Some(rule) => {
                    let reply = if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        None
                    };
                    match reply.as_ref().or(rule.replies.front()) {
                        Some(r) => (r.exit_code, r.stdout.clone(), r.stderr.clone(), r.timed_out),
                        None => (0, String::new(), String::new(), false),
                    }
                }
                None => (0, String::new(), String::new(), false),
            }
        };

        if let Some(stream) = &options.stream {
            for line in stdout.lines() {
                stream.sink.line(crate::invoker::Channel::Stdout, line);
                stream.tail.push(line);
            }
            for line in stderr.lines() {
                stream.sink.line(crate::invoker::Channel::Stderr, line);
            }
        }

        Ok(CommandResult {
            arguments,
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}
