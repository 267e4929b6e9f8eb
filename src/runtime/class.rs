use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Node;

/// A named method: formal parameter list plus its body tree.
///
/// The body is a [`Node::MethodBody`] wrapping the method's compound suite.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Node,
}

/// Class descriptor with single inheritance.
///
/// The parent handle is shared with the class registry, so a base class
/// always outlives its subclasses.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    name: String,
    methods: Vec<Method>,
    parent: Option<Rc<Class>>,
    method_index: HashMap<String, usize>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        debug_assert!(!name.is_empty(), "class name must not be empty");
        let method_index = methods
            .iter()
            .enumerate()
            .map(|(index, method)| (method.name.clone(), index))
            .collect();
        Self {
            name,
            methods,
            parent,
            method_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<Class>> {
        self.parent.as_ref()
    }

    /// Looks up a method by name, falling through to the parent chain.
    /// The nearest definition wins.
    pub fn get_method(&self, name: &str) -> Option<&Method> {
        if let Some(&index) = self.method_index.get(name) {
            return Some(&self.methods[index]);
        }
        self.parent.as_deref().and_then(|parent| parent.get_method(name))
    }

    /// True when a method with this name exists and takes exactly
    /// `argument_count` formal parameters.
    pub fn has_method(&self, name: &str, argument_count: usize) -> bool {
        self.get_method(name)
            .is_some_and(|method| method.formal_params.len() == argument_count)
    }
}
