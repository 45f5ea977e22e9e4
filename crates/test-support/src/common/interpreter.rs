//! A small tree-walking interpreter over [`ToyHost`].
//!
//! Programs are compiled once into nodes carrying their syntax sites, the
//! way a real host resolves tags when it builds its AST. Evaluation reports
//! enter / return / unwind checkpoints of every tagged node to a listener.
//!
//! Conventions the category rules rely on:
//! - a property assignment evaluates the value first and the receiver last,
//!   so the receiver is the first operand popped;
//! - a function body is a block that consumes everything its statements
//!   pushed and catches `return`, leaving one result for the boundary;
//! - parameters are bound by a prologue of `param = arg[i]` writes.

use super::toy_host::{ToyFrame, ToyHost, ToyObject, ToyScope, ToyValue};
use anyhow::anyhow;
use shadow_rt_core::{ArgumentCount, Category, ShadowError, SiteId, SyntaxSite, SyntaxSiteBuilder};
use shadow_rt_interceptor::{EventContext, ExecutionListener};
use std::collections::HashMap;
use std::sync::Arc;

/// Source-level expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Str(String),
    Nil,
    New(String),
    Local(String),
    SetLocal(String, Box<Expr>),
    Arg(usize),
    Add(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    GetProp(Box<Expr>, String),
    SetProp(Box<Expr>, String, Box<Expr>),
    GetGlobal(String),
    SetGlobal(String, Box<Expr>),
    GetClassVar(String),
    SetClassVar(String, Box<Expr>),
    Return(Box<Expr>),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn str(value: &str) -> Self {
        Expr::Str(value.to_string())
    }

    pub fn new_object(class: &str) -> Self {
        Expr::New(class.to_string())
    }

    pub fn local(name: &str) -> Self {
        Expr::Local(name.to_string())
    }

    pub fn set_local(name: &str, value: Expr) -> Self {
        Expr::SetLocal(name.to_string(), Box::new(value))
    }

    pub fn arg(index: usize) -> Self {
        Expr::Arg(index)
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::Add(Box::new(left), Box::new(right))
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call(name.to_string(), args)
    }

    pub fn get_prop(receiver: Expr, name: &str) -> Self {
        Expr::GetProp(Box::new(receiver), name.to_string())
    }

    pub fn set_prop(receiver: Expr, name: &str, value: Expr) -> Self {
        Expr::SetProp(Box::new(receiver), name.to_string(), Box::new(value))
    }

    pub fn global(name: &str) -> Self {
        Expr::GetGlobal(name.to_string())
    }

    pub fn set_global(name: &str, value: Expr) -> Self {
        Expr::SetGlobal(name.to_string(), Box::new(value))
    }

    pub fn class_var(name: &str) -> Self {
        Expr::GetClassVar(name.to_string())
    }

    pub fn set_class_var(name: &str, value: Expr) -> Self {
        Expr::SetClassVar(name.to_string(), Box::new(value))
    }

    pub fn ret(value: Expr) -> Self {
        Expr::Return(Box::new(value))
    }
}

struct Node {
    site: Option<SyntaxSite<ToyHost>>,
    kind: NodeKind,
}

enum NodeKind {
    Int(i64),
    Str(String),
    Nil,
    New(String),
    Local(String),
    SetLocal(String, Box<Node>),
    Arg(usize),
    Add(Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
    GetProp(Box<Node>, String),
    SetProp {
        receiver: Box<Node>,
        name: String,
        value: Box<Node>,
    },
    GetGlobal(String),
    SetGlobal(String, Box<Node>),
    GetClassVar(String),
    SetClassVar(String, Box<Node>),
    Return(Box<Node>),
    Body(Vec<Node>),
    Root(Box<Node>),
}

struct Function {
    root: Node,
}

struct Definition {
    name: String,
    params: Vec<String>,
    body: Vec<Expr>,
    traced: bool,
}

/// A compiled toy program.
pub struct Program {
    functions: HashMap<String, Function>,
    main: Function,
    scope: Arc<ToyScope>,
    site_count: u64,
}

impl Program {
    /// The class scope every class-variable site refers to.
    pub fn scope(&self) -> &Arc<ToyScope> {
        &self.scope
    }

    /// Number of tagged sites created at compile time.
    pub fn site_count(&self) -> u64 {
        self.site_count
    }

    pub fn run(&self, listener: &dyn ExecutionListener<ToyHost>) -> anyhow::Result<Run> {
        Interpreter::new(self, listener).run_main()
    }
}

/// Compiles definitions, assigning site ids in source order starting at 1.
pub struct ProgramBuilder {
    definitions: Vec<Definition>,
    main: Option<Definition>,
    scope: Arc<ToyScope>,
    next_site: u64,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            main: None,
            scope: ToyScope::new("Toy"),
            next_site: 0,
        }
    }

    pub fn function(self, name: &str, params: &[&str], body: Vec<Expr>) -> Self {
        self.define(name, params, body, true)
    }

    /// A function the host does not instrument: none of its nodes are tagged.
    pub fn untraced_function(self, name: &str, params: &[&str], body: Vec<Expr>) -> Self {
        self.define(name, params, body, false)
    }

    pub fn main(mut self, body: Vec<Expr>) -> Self {
        self.main = Some(Self::definition("main", &[], body, true));
        self
    }

    pub fn untraced_main(mut self, body: Vec<Expr>) -> Self {
        self.main = Some(Self::definition("main", &[], body, false));
        self
    }

    pub fn build(mut self) -> anyhow::Result<Program> {
        let main = self
            .main
            .take()
            .ok_or_else(|| anyhow!("program has no main"))?;
        let main = self.compile_function(main)?;
        let definitions = std::mem::take(&mut self.definitions);
        let mut functions = HashMap::new();
        for definition in definitions {
            let name = definition.name.clone();
            functions.insert(name, self.compile_function(definition)?);
        }
        Ok(Program {
            functions,
            main,
            scope: self.scope,
            site_count: self.next_site,
        })
    }

    fn define(mut self, name: &str, params: &[&str], body: Vec<Expr>, traced: bool) -> Self {
        self.definitions
            .push(Self::definition(name, params, body, traced));
        self
    }

    fn definition(name: &str, params: &[&str], body: Vec<Expr>, traced: bool) -> Definition {
        Definition {
            name: name.to_string(),
            params: params.iter().map(|param| param.to_string()).collect(),
            body,
            traced,
        }
    }

    fn compile_function(&mut self, definition: Definition) -> anyhow::Result<Function> {
        let traced = definition.traced;
        let root_label = if definition.name == "main" {
            "main".to_string()
        } else {
            format!("def {}", definition.name)
        };
        let root_site = self.site(traced, root_label, |site| {
            site.category(Category::FunctionBoundary)
        })?;
        let body_site = self.site(traced, format!("{} body", definition.name), |site| {
            site.category(Category::UseStackDefStack)
        })?;

        let mut statements = Vec::new();
        for (index, param) in definition.params.iter().enumerate() {
            let prologue = Expr::set_local(param, Expr::arg(index));
            statements.push(self.compile(&prologue, traced)?);
        }
        for expr in &definition.body {
            statements.push(self.compile(expr, traced)?);
        }

        let body = Node {
            site: body_site,
            kind: NodeKind::Body(statements),
        };
        Ok(Function {
            root: Node {
                site: root_site,
                kind: NodeKind::Root(Box::new(body)),
            },
        })
    }

    fn site(
        &mut self,
        traced: bool,
        label: impl Into<Arc<str>>,
        configure: impl FnOnce(SyntaxSiteBuilder<ToyHost>) -> SyntaxSiteBuilder<ToyHost>,
    ) -> anyhow::Result<Option<SyntaxSite<ToyHost>>> {
        if !traced {
            return Ok(None);
        }
        self.next_site += 1;
        let builder = SyntaxSite::builder(SiteId::new(self.next_site), label);
        Ok(Some(configure(builder).build()?))
    }

    fn compile(&mut self, expr: &Expr, traced: bool) -> anyhow::Result<Node> {
        let node = match expr {
            Expr::Int(value) => Node {
                site: self.site(traced, value.to_string(), |site| {
                    site.category(Category::NoUseDefStack)
                })?,
                kind: NodeKind::Int(*value),
            },
            Expr::Str(value) => Node {
                site: self.site(traced, format!("{:?}", value), |site| {
                    site.category(Category::NoUseDefStack)
                })?,
                kind: NodeKind::Str(value.clone()),
            },
            Expr::Nil => Node {
                site: self.site(traced, "nil", |site| site.category(Category::NoUseDefStack))?,
                kind: NodeKind::Nil,
            },
            Expr::New(class) => Node {
                site: self.site(traced, format!("{}.new", class), |site| {
                    site.category(Category::NoUseDefStack)
                })?,
                kind: NodeKind::New(class.clone()),
            },
            Expr::Local(name) => Node {
                site: self.site(traced, name.as_str(), |site| {
                    site.category(Category::UseLocalDefStack).local(name.as_str())
                })?,
                kind: NodeKind::Local(name.clone()),
            },
            Expr::SetLocal(name, value) => {
                let site = self.site(traced, format!("set {}", name), |site| {
                    site.category(Category::UseStackDefLocalStack)
                        .local(name.as_str())
                })?;
                Node {
                    site,
                    kind: NodeKind::SetLocal(name.clone(), Box::new(self.compile(value, traced)?)),
                }
            }
            Expr::Arg(index) => Node {
                site: self.site(traced, format!("arg[{}]", index), |site| {
                    site.category(Category::UseArgDefStack)
                        .argument(*index, ArgumentCount::FromFrame)
                })?,
                kind: NodeKind::Arg(*index),
            },
            Expr::Add(left, right) => {
                let site = self.site(traced, "+", |site| site.category(Category::UseStackDefStack))?;
                let left = self.compile(left, traced)?;
                let right = self.compile(right, traced)?;
                Node {
                    site,
                    kind: NodeKind::Add(Box::new(left), Box::new(right)),
                }
            }
            Expr::Call(name, args) => {
                let site = self.site(traced, format!("{}()", name), |site| {
                    site.category(Category::UseStackDefStack)
                        .category(Category::CallNode)
                })?;
                let args = args
                    .iter()
                    .map(|arg| self.compile(arg, traced))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Node {
                    site,
                    kind: NodeKind::Call(name.clone(), args),
                }
            }
            Expr::GetProp(receiver, name) => {
                let site = self.site(traced, format!(".{}", name), |site| {
                    site.category(Category::UsePropertyStackDefStack)
                        .property(name.as_str())
                })?;
                Node {
                    site,
                    kind: NodeKind::GetProp(Box::new(self.compile(receiver, traced)?), name.clone()),
                }
            }
            Expr::SetProp(receiver, name, value) => {
                let site = self.site(traced, format!("set .{}", name), |site| {
                    site.category(Category::UseStackDefPropertyStack)
                        .property(name.as_str())
                })?;
                let value = self.compile(value, traced)?;
                let receiver = self.compile(receiver, traced)?;
                Node {
                    site,
                    kind: NodeKind::SetProp {
                        receiver: Box::new(receiver),
                        name: name.clone(),
                        value: Box::new(value),
                    },
                }
            }
            Expr::GetGlobal(name) => Node {
                site: self.site(traced, format!("${}", name), |site| {
                    site.category(Category::UseGlobalDefStack)
                        .global(name.as_str())
                })?,
                kind: NodeKind::GetGlobal(name.clone()),
            },
            Expr::SetGlobal(name, value) => {
                let site = self.site(traced, format!("set ${}", name), |site| {
                    site.category(Category::UseStackDefGlobal)
                        .global(name.as_str())
                })?;
                Node {
                    site,
                    kind: NodeKind::SetGlobal(name.clone(), Box::new(self.compile(value, traced)?)),
                }
            }
            Expr::GetClassVar(name) => {
                let scope = Arc::clone(&self.scope);
                Node {
                    site: self.site(traced, format!("@@{}", name), |site| {
                        site.category(Category::UseClassVarDefStack)
                            .class_var(name.as_str(), scope)
                    })?,
                    kind: NodeKind::GetClassVar(name.clone()),
                }
            }
            Expr::SetClassVar(name, value) => {
                let scope = Arc::clone(&self.scope);
                let site = self.site(traced, format!("set @@{}", name), |site| {
                    site.category(Category::UseStackDefClassVar)
                        .class_var(name.as_str(), scope)
                })?;
                Node {
                    site,
                    kind: NodeKind::SetClassVar(name.clone(), Box::new(self.compile(value, traced)?)),
                }
            }
            Expr::Return(value) => {
                let site = self.site(traced, "return", |site| {
                    site.category(Category::UseStackDefReturn)
                })?;
                Node {
                    site,
                    kind: NodeKind::Return(Box::new(self.compile(value, traced)?)),
                }
            }
        };
        Ok(node)
    }
}

/// Outcome of running `main`.
#[derive(Debug)]
pub struct Run {
    /// The main frame; kept alive so its shadow record stays inspectable.
    pub frame: Arc<ToyFrame>,
    pub value: ToyValue,
}

enum Flow {
    Return(ToyValue),
    Fail(anyhow::Error),
}

impl From<anyhow::Error> for Flow {
    fn from(err: anyhow::Error) -> Self {
        Flow::Fail(err)
    }
}

impl From<ShadowError> for Flow {
    fn from(err: ShadowError) -> Self {
        Flow::Fail(err.into())
    }
}

struct Env {
    frame: Arc<ToyFrame>,
    locals: HashMap<String, ToyValue>,
}

pub struct Interpreter<'a> {
    program: &'a Program,
    listener: &'a dyn ExecutionListener<ToyHost>,
    globals: HashMap<String, ToyValue>,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, listener: &'a dyn ExecutionListener<ToyHost>) -> Self {
        Self {
            program,
            listener,
            globals: HashMap::new(),
        }
    }

    pub fn run_main(&mut self) -> anyhow::Result<Run> {
        let frame = ToyFrame::root("main");
        let program = self.program;
        match self.invoke(&program.main, Arc::clone(&frame)) {
            Ok(value) => Ok(Run { frame, value }),
            Err(Flow::Return(value)) => Ok(Run { frame, value }),
            Err(Flow::Fail(err)) => Err(err),
        }
    }

    fn invoke(&mut self, function: &Function, frame: Arc<ToyFrame>) -> Result<ToyValue, Flow> {
        tracing::trace!(function = %frame.name, args = frame.args.len(), "toy call");
        let mut env = Env {
            frame,
            locals: HashMap::new(),
        };
        self.eval(&function.root, &mut env)
    }

    // Listener failures abort evaluation without further checkpoints.
    fn eval(&mut self, node: &Node, env: &mut Env) -> Result<ToyValue, Flow> {
        let Some(site) = &node.site else {
            return self.eval_kind(&node.kind, env);
        };
        let listener = self.listener;
        let frame = Arc::clone(&env.frame);
        listener.on_enter(EventContext::new(site, &frame))?;
        match self.eval_kind(&node.kind, env) {
            Ok(value) => {
                listener.on_return_value(EventContext::new(site, &frame), &value)?;
                Ok(value)
            }
            Err(Flow::Return(value)) => {
                listener.on_return_exceptional(EventContext::new(site, &frame), &("return", &value))?;
                Err(Flow::Return(value))
            }
            Err(fail) => Err(fail),
        }
    }

    fn eval_kind(&mut self, kind: &NodeKind, env: &mut Env) -> Result<ToyValue, Flow> {
        let value = match kind {
            NodeKind::Int(value) => ToyValue::Int(*value),
            NodeKind::Str(value) => ToyValue::Str(value.clone()),
            NodeKind::Nil => ToyValue::Nil,
            NodeKind::New(class) => ToyValue::Object(ToyObject::new(class.as_str())),
            NodeKind::Local(name) => env.locals.get(name).cloned().unwrap_or(ToyValue::Nil),
            NodeKind::SetLocal(name, value) => {
                let value = self.eval(value, env)?;
                env.locals.insert(name.clone(), value.clone());
                value
            }
            NodeKind::Arg(index) => env
                .frame
                .args
                .get(*index)
                .cloned()
                .ok_or_else(|| anyhow!("{} has no argument {}", env.frame.name, index))?,
            NodeKind::Add(left, right) => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                match (&left, &right) {
                    (ToyValue::Int(a), ToyValue::Int(b)) => ToyValue::Int(a + b),
                    (ToyValue::Str(a), ToyValue::Str(b)) => ToyValue::Str(format!("{}{}", a, b)),
                    _ => {
                        return Err(anyhow!("cannot add {:?} and {:?}", left, right).into());
                    }
                }
            }
            NodeKind::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                let program = self.program;
                let function = program
                    .functions
                    .get(name)
                    .ok_or_else(|| anyhow!("undefined function {}", name))?;
                let callee = ToyFrame::called_from(&env.frame, name.as_str(), values);
                self.invoke(function, callee)?
            }
            NodeKind::GetProp(receiver, name) => match self.eval(receiver, env)? {
                ToyValue::Object(object) => object.get(name)?,
                _ => ToyValue::Nil,
            },
            NodeKind::SetProp {
                receiver,
                name,
                value,
            } => {
                let value = self.eval(value, env)?;
                if let ToyValue::Object(object) = self.eval(receiver, env)? {
                    object.set(name, value.clone())?;
                }
                value
            }
            NodeKind::GetGlobal(name) => self.globals.get(name).cloned().unwrap_or(ToyValue::Nil),
            NodeKind::SetGlobal(name, value) => {
                let value = self.eval(value, env)?;
                self.globals.insert(name.clone(), value.clone());
                value
            }
            NodeKind::GetClassVar(name) => self.program.scope.get(name)?,
            NodeKind::SetClassVar(name, value) => {
                let value = self.eval(value, env)?;
                self.program.scope.set(name, value.clone())?;
                value
            }
            NodeKind::Return(value) => {
                let value = self.eval(value, env)?;
                return Err(Flow::Return(value));
            }
            NodeKind::Body(statements) => {
                let mut last = ToyValue::Nil;
                for statement in statements {
                    match self.eval(statement, env) {
                        Ok(value) => last = value,
                        Err(Flow::Return(value)) => return Ok(value),
                        Err(fail) => return Err(fail),
                    }
                }
                last
            }
            NodeKind::Root(body) => self.eval(body, env)?,
        };
        Ok(value)
    }
}
