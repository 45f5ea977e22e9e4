pub mod interpreter;
pub mod toy_host;

pub use interpreter::{Expr, Interpreter, Program, ProgramBuilder, Run};
pub use toy_host::{ToyFrame, ToyHost, ToyObject, ToyScope, ToyValue};
