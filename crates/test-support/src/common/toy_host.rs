//! Toy host entities.

use shadow_rt_core::Host;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// One activation of a toy function.
#[derive(Debug)]
pub struct ToyFrame {
    pub name: String,
    pub caller: Option<Arc<ToyFrame>>,
    pub args: Vec<ToyValue>,
}

impl ToyFrame {
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            caller: None,
            args: Vec::new(),
        })
    }

    pub fn called_from(
        caller: &Arc<ToyFrame>,
        name: impl Into<String>,
        args: Vec<ToyValue>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            caller: Some(Arc::clone(caller)),
            args,
        })
    }
}

#[derive(Debug)]
pub struct ToyObject {
    pub class: String,
    properties: Mutex<HashMap<String, ToyValue>>,
}

impl ToyObject {
    pub fn new(class: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            class: class.into(),
            properties: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> anyhow::Result<ToyValue> {
        let properties = self
            .properties
            .lock()
            .map_err(|_| anyhow::anyhow!("property table poisoned"))?;
        Ok(properties.get(name).cloned().unwrap_or(ToyValue::Nil))
    }

    pub fn set(&self, name: &str, value: ToyValue) -> anyhow::Result<()> {
        self.properties
            .lock()
            .map_err(|_| anyhow::anyhow!("property table poisoned"))?
            .insert(name.to_string(), value);
        Ok(())
    }
}

/// A class body owning class variables.
#[derive(Debug)]
pub struct ToyScope {
    pub name: String,
    variables: Mutex<HashMap<String, ToyValue>>,
}

impl ToyScope {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            variables: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> anyhow::Result<ToyValue> {
        let variables = self
            .variables
            .lock()
            .map_err(|_| anyhow::anyhow!("class variable table poisoned"))?;
        Ok(variables.get(name).cloned().unwrap_or(ToyValue::Nil))
    }

    pub fn set(&self, name: &str, value: ToyValue) -> anyhow::Result<()> {
        self.variables
            .lock()
            .map_err(|_| anyhow::anyhow!("class variable table poisoned"))?
            .insert(name.to_string(), value);
        Ok(())
    }
}

#[derive(Clone)]
pub enum ToyValue {
    Nil,
    Int(i64),
    Str(String),
    Object(Arc<ToyObject>),
}

impl ToyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ToyValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl PartialEq for ToyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ToyValue::Nil, ToyValue::Nil) => true,
            (ToyValue::Int(a), ToyValue::Int(b)) => a == b,
            (ToyValue::Str(a), ToyValue::Str(b)) => a == b,
            (ToyValue::Object(a), ToyValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ToyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToyValue::Nil => f.write_str("nil"),
            ToyValue::Int(value) => write!(f, "{}", value),
            ToyValue::Str(value) => write!(f, "{:?}", value),
            ToyValue::Object(object) => write!(f, "#<{}>", object.class),
        }
    }
}

/// Host view over the toy runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToyHost;

impl Host for ToyHost {
    type Frame = ToyFrame;
    type Object = ToyObject;
    type Scope = ToyScope;
    type Value = ToyValue;

    fn caller_of(&self, frame: &Arc<ToyFrame>) -> Option<Arc<ToyFrame>> {
        frame.caller.clone()
    }

    fn argument_count(&self, frame: &Arc<ToyFrame>) -> usize {
        frame.args.len()
    }

    fn object_of(&self, value: &ToyValue) -> Option<Arc<ToyObject>> {
        match value {
            ToyValue::Object(object) => Some(Arc::clone(object)),
            _ => None,
        }
    }
}
