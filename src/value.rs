//! The values that flow through the operand stack and the scope chain.
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;

use crate::ops::Native;

/// A single stacklang value.
///
/// Values are immutable once constructed. Blocks share their captured body,
/// so cloning a value is always cheap.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A floating-point scalar.
    Number(f64),
    /// A name used as data, written `/name`.
    Symbol(Rc<str>),
    /// A bare name that is looked up in the scope chain when evaluated.
    Operator(Rc<str>),
    /// A captured, unevaluated sequence of values, written `{ ... }`.
    Block(Rc<[Value]>),
    /// A built-in operation.
    Native(Native),
}

impl Value {
    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Rc::from(name))
    }

    pub fn operator(name: &str) -> Self {
        Value::Operator(Rc::from(name))
    }

    pub fn block(body: Vec<Value>) -> Self {
        Value::Block(Rc::from(body))
    }

    /// The name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::Operator(_) => "operator",
            Value::Block(_) => "block",
            Value::Native(_) => "native",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Native> for Value {
    fn from(native: Native) -> Self {
        Value::Native(native)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(name) => write!(f, "/{name}"),
            Value::Operator(name) => write!(f, "{name}"),
            Value::Block(body) => {
                f.write_str("{")?;
                for value in body.iter() {
                    write!(f, " {value}")?;
                }
                f.write_str(" }")
            }
            Value::Native(native) => write!(f, "--{}--", native.name()),
        }
    }
}

/// A single level of the scope chain.
pub type Scope = HashMap<Rc<str>, Value>;

/// A full, owned copy of the machine state at one point of the execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// The operand stack, bottom to top.
    pub stack: Vec<Value>,
    /// The scope chain, base to innermost.
    pub scopes: Vec<Scope>,
    /// Open block literals, oldest to newest.
    pub blocks: Vec<Vec<Value>>,
}

impl Snapshot {
    pub fn top(&self) -> Option<&Value> {
        self.stack.last()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stack: [")?;
        for (i, value) in self.stack.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")?;

        for (depth, scope) in self.scopes.iter().enumerate() {
            // The base scope only holds the natives.
            if depth == 0 && scope.values().all(|v| matches!(v, Value::Native(_))) {
                continue;
            }
            let mut names: Vec<_> = scope.iter().collect();
            names.sort_by(|a, b| a.0.cmp(b.0));
            write!(f, " scope{depth}: {{")?;
            for (name, value) in names {
                write!(f, " {name}={value}")?;
            }
            f.write_str(" }")?;
        }

        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, " open{i}: [")?;
            for value in block {
                write!(f, " {value}")?;
            }
            f.write_str(" ]")?;
        }
        Ok(())
    }
}
