use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::runtime::class::Class;
use crate::runtime::value::Value;

/// A scope: identifiers bound to value handles.
pub type Closure = HashMap<String, Value>;

/// Shared, mutable handle to a class instance.
///
/// Instances may form reference cycles through their fields; such cycles are
/// allowed to leak.
pub type InstanceRef = Rc<RefCell<Instance>>;

/// A class instance: its descriptor plus per-instance fields.
#[derive(Debug)]
pub struct Instance {
    class: Rc<Class>,
    fields: Closure,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: Closure::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn fields(&self) -> &Closure {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Closure {
        &mut self.fields
    }

    pub fn has_method(&self, name: &str, argument_count: usize) -> bool {
        self.class.has_method(name, argument_count)
    }
}
