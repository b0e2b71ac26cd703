//! Step-wise execution of a whole program as a lazy sequence of events.
use std::collections::VecDeque;

use tracing::debug;

use crate::parser::{tokenize, Tokens};
use crate::vm::{Event, EventLog, Machine, RunError, VMOptions};

/// Runs a program token by token, yielding every [`Event`] as it happens.
///
/// Nothing is evaluated until the iterator is polled; consuming it to the
/// end runs the program to completion. If the program fails, the events up
/// to the failure are yielded first, then the error, then the iterator ends.
///
/// # Example
/// ```
/// use stacklang::StackLang;
/// use stacklang::vm::Event;
/// use stacklang::value::Value;
///
/// let outputs: Vec<Value> = StackLang::new("3 4 + puts")
///     .filter_map(|event| match event {
///         Ok(Event::Output(value)) => Some(value),
///         _ => None,
///     })
///     .collect();
/// assert_eq!(outputs, vec![Value::Number(7.0)]);
/// ```
pub struct StackLang<'a> {
    tokens: Tokens<'a>,
    machine: Machine<EventLog>,
    pending: VecDeque<Event>,
    error: Option<RunError>,
    finished: bool,
}

impl<'a> StackLang<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_options(source, VMOptions::default())
    }

    pub fn with_options(source: &'a str, options: VMOptions) -> Self {
        StackLang {
            tokens: tokenize(source),
            machine: Machine::new(options, EventLog::default()),
            pending: VecDeque::new(),
            error: None,
            finished: false,
        }
    }

    /// The machine driving this run, for inspecting its current state.
    pub fn machine(&self) -> &Machine<EventLog> {
        &self.machine
    }

    /// Feeds the next token to the machine, queueing the produced events.
    ///
    /// Returns `false` once the source is exhausted or a token has failed.
    fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let Some(token) = self.tokens.next() else {
            self.finished = true;
            debug!(evaluations = self.machine.instructions_run(), "program finished");
            return false;
        };

        let result = self.machine.step(token.text);
        self.pending.extend(self.machine.tracer_mut().take());
        if let Err(error) = result {
            let error = RunError::at(&token, self.machine.instructions_run(), error);
            debug!(%error, "program failed");
            self.error = Some(error);
            self.finished = true;
        }
        true
    }
}

impl Iterator for StackLang<'_> {
    type Item = Result<Event, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if let Some(error) = self.error.take() {
                return Some(Err(error));
            }
            if !self.advance() {
                return None;
            }
        }
    }
}

impl std::iter::FusedIterator for StackLang<'_> {}
