use std::rc::Rc;

use crate::value::{Scope, Value};

/// The built-in operations, bound by name in the base scope.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Native {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    If,
    Def,
    Exch,
    Puts,
}

impl Native {
    pub const ALL: [Native; 9] = [
        Native::Add,
        Native::Sub,
        Native::Mul,
        Native::Div,
        Native::Lt,
        Native::If,
        Native::Def,
        Native::Exch,
        Native::Puts,
    ];

    /// The name the operation is bound to in the base scope.
    pub fn name(self) -> &'static str {
        match self {
            Native::Add => "+",
            Native::Sub => "-",
            Native::Mul => "*",
            Native::Div => "/",
            Native::Lt => "<",
            Native::If => "if",
            Native::Def => "def",
            Native::Exch => "exch",
            Native::Puts => "puts",
        }
    }

    pub fn by_name(name: &str) -> Option<Native> {
        Native::ALL.iter().copied().find(|native| native.name() == name)
    }
}

/// Creates the base scope with every native operation bound under its name.
pub fn base_scope() -> Scope {
    Native::ALL.iter().map(|&native| (Rc::from(native.name()), Value::Native(native))).collect()
}
