//! Functions for executing stacklang programs.
use std::rc::Rc;
use std::collections::hash_map::Entry;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    config::get_config,
    ops::{base_scope, Native},
    parser::{self, Token, TokenKind},
    value::{Scope, Snapshot, Value},
};


/// A borrowed view of the machine state, handed to a [`Tracer`].
#[derive(Clone, Copy, Debug)]
pub struct StateView<'a> {
    pub stack: &'a [Value],
    pub scopes: &'a [Scope],
    pub blocks: &'a [Vec<Value>],
}

impl StateView<'_> {
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            stack: self.stack.to_vec(),
            scopes: self.scopes.to_vec(),
            blocks: self.blocks.to_vec(),
        }
    }
}

/// A trait for observing the machine as it evaluates.
///
/// Every mutation of the stack, scope chain or block stack is reported
/// in the order it happens.
pub trait Tracer {
    /// The state changed.
    fn state(&mut self, state: StateView<'_>);
    /// `value` was removed from the top of the operand stack.
    fn pop(&mut self, state: StateView<'_>, value: &Value);
    /// `puts` produced `value`.
    fn output(&mut self, value: &Value);
}

/// An implementation of [`Tracer`] that ignores everything.
///
/// This is the best choice if you only need the final result.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoEvents {}

impl Tracer for NoEvents {
    #[inline(always)]
    fn state(&mut self, _: StateView<'_>) {}
    #[inline(always)]
    fn pop(&mut self, _: StateView<'_>, _: &Value) {}
    #[inline(always)]
    fn output(&mut self, _: &Value) {}
}

/// One externally observable step of the execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    State(Snapshot),
    Output(Value),
    StackPop { state: Snapshot, value: Value },
}

impl Event {
    /// The state carried by this event, if any.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Event::State(state) | Event::StackPop { state, .. } => Some(state),
            Event::Output(_) => None,
        }
    }
}

/// A [`Tracer`] recording every event with a full snapshot.
#[derive(Default, Debug, Clone)]
pub struct EventLog {
    pub events: Vec<Event>,
}

impl EventLog {
    /// Removes and returns the events recorded so far.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// All values produced by `puts`, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &Value> + '_ {
        self.events.iter().filter_map(|event| match event {
            Event::Output(value) => Some(value),
            _ => None,
        })
    }
}

impl Tracer for EventLog {
    fn state(&mut self, state: StateView<'_>) {
        self.events.push(Event::State(state.to_snapshot()));
    }

    fn pop(&mut self, state: StateView<'_>, value: &Value) {
        self.events.push(Event::StackPop { state: state.to_snapshot(), value: value.clone() });
    }

    fn output(&mut self, value: &Value) {
        self.events.push(Event::Output(value.clone()));
    }
}

/// An error that can occur while evaluating a single token.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationError {
    #[error("Removing from an empty stack")]
    StackUnderflow,
    #[error("Block stack underflow: `}}` without a matching `{{`")]
    BlockStackUnderflow,
    #[error("`{name}` is not a defined operation")]
    UndefinedOperation { name: String },
    #[error("`{operator}` expected {expected}, found {found}")]
    TypeMismatch { operator: &'static str, expected: &'static str, found: String },
    #[error("Adding to a full stack (limit {limit})")]
    StackOverflow { limit: usize },
    #[error("Call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },
    #[error("Operation limit exceeded ({count} evaluations)")]
    OpLimitExceeded { count: u64 },
}

fn type_mismatch(native: Native, expected: &'static str, found: &[&Value]) -> OperationError {
    let found = found.iter().map(|v| format!("`{v}` ({})", v.kind())).collect::<Vec<_>>().join(" and ");
    OperationError::TypeMismatch { operator: native.name(), expected, found }
}

fn expect_block(native: Native, value: Value) -> Result<Rc<[Value]>, OperationError> {
    match value {
        Value::Block(body) => Ok(body),
        other => Err(type_mismatch(native, "a block", &[&other])),
    }
}

/// Options for the stacklang machine.
#[derive(Debug, Clone)]
pub struct VMOptions {
    /// The maximum size of the operand stack.
    max_stack_size: usize,
    /// The maximum number of nested block invocations.
    max_call_depth: usize,
    /// The maximum number of evaluations, if this is reached,
    /// the program will stop with an error.
    ///
    /// Set to [`u64::MAX`] to disable this limit.
    max_op_count: u64,
}

impl VMOptions {
    /// Create a new set of VM options.
    pub fn new(max_stack_size: usize, max_call_depth: usize, max_op_count: u64) -> Self {
        Self { max_stack_size, max_call_depth, max_op_count }
    }
}

impl Default for VMOptions {
    /// Options taken from the environment, see [`crate::config`].
    fn default() -> Self {
        let config = get_config();
        Self::new(config.max_stack_size, config.max_call_depth, config.max_op_count)
    }
}

/// The stacklang virtual machine.
///
/// Owns the operand stack, the scope chain and the stack of blocks which
/// are being captured. It is fed one token at a time with [`Machine::step`].
#[derive(Clone, Debug)]
pub struct Machine<T: Tracer> {
    stack: Vec<Value>,
    scopes: Vec<Scope>,
    blocks: Vec<Vec<Value>>,
    depth: usize,
    instructions_run: u64,
    options: VMOptions,
    tracer: T,
}

impl<T: Tracer> Machine<T> {
    pub fn new(options: VMOptions, tracer: T) -> Self {
        Machine {
            stack: Vec::new(),
            scopes: vec![base_scope()],
            blocks: Vec::new(),
            depth: 0,
            instructions_run: 0,
            options,
            tracer,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn blocks(&self) -> &[Vec<Value>] {
        &self.blocks
    }

    /// The number of evaluations performed so far.
    pub fn instructions_run(&self) -> u64 {
        self.instructions_run
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut T {
        &mut self.tracer
    }

    pub fn snapshot(&self) -> Snapshot {
        self.view().to_snapshot()
    }

    fn view(&self) -> StateView<'_> {
        StateView { stack: &self.stack, scopes: &self.scopes, blocks: &self.blocks }
    }

    fn emit_state(&mut self) {
        let view = StateView { stack: &self.stack, scopes: &self.scopes, blocks: &self.blocks };
        self.tracer.state(view);
    }

    fn pop(&mut self) -> Result<Value, OperationError> {
        let value = self.stack.pop().ok_or(OperationError::StackUnderflow)?;
        let view = StateView { stack: &self.stack, scopes: &self.scopes, blocks: &self.blocks };
        self.tracer.pop(view, &value);
        Ok(value)
    }

    fn push(&mut self, value: Value) -> Result<(), OperationError> {
        if self.stack.len() >= self.options.max_stack_size {
            return Err(OperationError::StackOverflow { limit: self.options.max_stack_size });
        }
        self.stack.push(value);
        self.emit_state();
        Ok(())
    }

    /// Looks `name` up from the innermost scope towards the base scope.
    pub fn find_var(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Binds `name` in the innermost scope unless it is already bound there.
    fn define(&mut self, name: Rc<str>, value: Value) {
        let depth = self.scopes.len() - 1;
        let Some(scope) = self.scopes.last_mut() else { return };
        match scope.entry(name) {
            Entry::Occupied(entry) => {
                debug!(name = %entry.key(), depth, "already defined in this scope, ignoring");
            }
            Entry::Vacant(entry) => {
                debug!(name = %entry.key(), %value, depth, "def");
                entry.insert(value);
            }
        }
    }

    fn enter(&mut self) -> Result<(), OperationError> {
        if self.depth >= self.options.max_call_depth {
            return Err(OperationError::CallDepthExceeded { limit: self.options.max_call_depth });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Consumes a single source token.
    pub fn step(&mut self, token: &str) -> Result<(), OperationError> {
        trace!(token, "step");
        match parser::classify(token) {
            TokenKind::Empty => {
                self.emit_state();
                Ok(())
            }
            TokenKind::Open => {
                self.blocks.push(Vec::new());
                self.emit_state();
                Ok(())
            }
            TokenKind::Close => {
                let body = self.blocks.pop().ok_or(OperationError::BlockStackUnderflow)?;
                self.emit_state();
                self.eval(Value::block(body))
            }
            TokenKind::Value(value) => self.eval(value),
        }
    }

    /// Evaluates a value.
    ///
    /// While a block literal is open the value is captured into it instead.
    pub fn eval(&mut self, value: Value) -> Result<(), OperationError> {
        self.instructions_run += 1;
        if self.instructions_run > self.options.max_op_count {
            return Err(OperationError::OpLimitExceeded { count: self.instructions_run - 1 });
        }
        trace!(%value, "eval");

        if let Some(body) = self.blocks.last_mut() {
            body.push(value);
            self.emit_state();
            return Ok(());
        }

        let name = match value {
            Value::Operator(name) => name,
            other => return self.push(other),
        };

        match self.find_var(&name).cloned() {
            None => Err(OperationError::UndefinedOperation { name: name.to_string() }),
            Some(Value::Block(body)) => self.invoke(&body),
            Some(Value::Native(native)) => self.apply(native),
            Some(other) => self.push(other),
        }
    }

    /// Runs a block body in a fresh scope, which is dropped afterwards.
    fn invoke(&mut self, body: &[Value]) -> Result<(), OperationError> {
        self.enter()?;
        self.scopes.push(Scope::default());
        debug!(depth = self.scopes.len() - 1, "push scope");
        self.emit_state();

        self.run_body(body)?;

        self.scopes.pop();
        debug!(depth = self.scopes.len(), "pop scope");
        self.emit_state();
        self.leave();
        Ok(())
    }

    /// Runs a block body directly on the current scope.
    fn run_in_place(&mut self, body: &[Value]) -> Result<(), OperationError> {
        self.enter()?;
        self.run_body(body)?;
        self.leave();
        Ok(())
    }

    fn run_body(&mut self, body: &[Value]) -> Result<(), OperationError> {
        for value in body {
            self.eval(value.clone())?;
        }
        Ok(())
    }

    fn binary(&mut self, native: Native, f: impl FnOnce(f64, f64) -> f64) -> Result<(), OperationError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::Number(f(*a, *b))),
            _ => Err(type_mismatch(native, "two numbers", &[&left, &right])),
        }
    }

    fn apply(&mut self, native: Native) -> Result<(), OperationError> {
        trace!(native = native.name(), "apply");
        match native {
            Native::Add => self.binary(native, |a, b| a + b),
            Native::Sub => self.binary(native, |a, b| a - b),
            Native::Mul => self.binary(native, |a, b| a * b),
            Native::Div => self.binary(native, |a, b| a / b),
            Native::Lt => self.binary(native, |a, b| if a < b { 1.0 } else { 0.0 }),
            Native::If => {
                let otherwise = self.pop()?;
                let otherwise = expect_block(native, otherwise)?;
                let then = self.pop()?;
                let then = expect_block(native, then)?;

                // The condition is either a block run in place or a plain value.
                match self.pop()? {
                    Value::Block(condition) => self.run_in_place(&condition)?,
                    other => self.eval(other)?,
                }
                let result = self.pop()?;
                let flag = result
                    .as_number()
                    .ok_or_else(|| type_mismatch(native, "a number as the condition result", &[&result]))?;

                // NaN is falsy.
                let branch = if flag != 0.0 && !flag.is_nan() { then } else { otherwise };
                self.run_in_place(&branch)
            }
            Native::Def => {
                let value = self.pop()?;
                self.eval(value)?;
                let value = self.pop()?;
                let name = match self.pop()? {
                    Value::Symbol(name) => name,
                    other => return Err(type_mismatch(native, "a symbol", &[&other])),
                };
                self.define(name, value);
                self.emit_state();
                Ok(())
            }
            Native::Exch => {
                let last = self.pop()?;
                let second = self.pop()?;
                // `second` is evaluated, then re-pushed above `last`.
                self.eval(second.clone())?;
                self.push(last)?;
                self.push(second)
            }
            Native::Puts => {
                let value = self.pop()?;
                debug!(%value, "puts");
                self.tracer.output(&value);
                Ok(())
            }
        }
    }
}

/// An error that happened while running a stacklang program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The evaluation of a specific token failed.
    #[error("Token `{token}` at line {line}, column {column} failed (instruction counter {instruction_counter}): {error}")]
    InstructionFailed {
        /// The text of the token which failed.
        token: String,
        /// 1-based line of the token.
        line: usize,
        /// 1-based column of the token.
        column: usize,
        /// The number of evaluations performed before the failure.
        instruction_counter: u64,
        /// The specific error within the evaluation.
        error: OperationError,
    },
}

impl RunError {
    pub(crate) fn at(token: &Token<'_>, instruction_counter: u64, error: OperationError) -> Self {
        RunError::InstructionFailed {
            token: token.text.to_string(),
            line: token.line,
            column: token.column,
            instruction_counter,
            error,
        }
    }

    /// The underlying evaluation error.
    pub fn error(&self) -> &OperationError {
        match self {
            RunError::InstructionFailed { error, .. } => error,
        }
    }
}

/// The successful result of running a stacklang program.
#[derive(Debug, Clone)]
pub struct RunResult<T: Tracer> {
    /// The resulting operand stack, bottom to top.
    pub stack: Vec<Value>,
    /// The number of evaluations which have been run.
    pub instruction_counter: u64,
    /// Block literals still open when the source ended.
    pub open_blocks: usize,
    pub tracer: T,
}

impl<T: Tracer> From<Machine<T>> for RunResult<T> {
    fn from(m: Machine<T>) -> Self {
        RunResult {
            stack: m.stack,
            instruction_counter: m.instructions_run,
            open_blocks: m.blocks.len(),
            tracer: m.tracer,
        }
    }
}

/// Run a stacklang program with the given options.
///
/// # Example
/// ```
/// use stacklang::value::Value;
/// use stacklang::vm::{run, VMOptions};
///
/// let result = run("3 4 +", VMOptions::new(100, 100, u64::MAX)).unwrap();
/// assert_eq!(result.stack, vec![Value::Number(7.0)]);
/// ```
pub fn run(source: &str, options: VMOptions) -> Result<RunResult<NoEvents>, RunError> {
    run_with_tracer(source, options, NoEvents::default())
}

/// Run a stacklang program, reporting every step to `tracer`.
/// If you do not need to observe the execution, use the [`run`] function instead.
pub fn run_with_tracer<T: Tracer>(
    source: &str,
    options: VMOptions,
    tracer: T,
) -> Result<RunResult<T>, RunError> {
    let mut m = Machine::new(options, tracer);
    for token in parser::tokenize(source) {
        m.step(token.text).map_err(|error| RunError::at(&token, m.instructions_run, error))?;
    }
    if !m.blocks.is_empty() {
        debug!(open = m.blocks.len(), "source ended with open blocks");
    }
    Ok(m.into())
}
