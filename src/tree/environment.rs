use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::tree::value::Value;

/// One frame of the scope chain: a name→value map plus a handle to the
/// enclosing frame. The global frame is the only one with `parent: None`.
///
/// Frames are arena-like in spirit (§9: "Arena storage indexed by handle
/// is an acceptable alternative; it trivializes lifetimes ... at the cost
/// of never freeing individual frames"), except here `Rc` *does* free a
/// frame the moment its last closure drops it — Rust's ownership model
/// gives us precise frame lifetimes for free, so there's no bulk-free step
/// to perform at shutdown.
pub struct Frame {
    values: HashMap<String, Value>,
    parent: Option<Environment>,
}

#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    pub fn global() -> Environment {
        Environment(Rc::new(RefCell::new(Frame { values: HashMap::new(), parent: None })))
    }

    pub fn child(parent: &Environment) -> Environment {
        Environment(Rc::new(RefCell::new(Frame { values: HashMap::new(), parent: Some(parent.clone()) })))
    }

    pub fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().values.insert(name.to_string(), value);
    }

    fn ancestor(&self, distance: usize) -> Environment {
        let mut env = self.clone();
        for _ in 0..distance {
            let parent = env.0.borrow().parent.clone().expect("resolver distance outran the frame chain");
            env = parent;
        }
        env
    }

    /// Looks up `name` walking exactly `distance` parent links, as
    /// computed by the resolver (§4.4: "call `get_at(distance, name)` on
    /// the current environment").
    pub fn get_at(&self, distance: usize, name: &str) -> Value {
        self.ancestor(distance).0.borrow().values.get(name).cloned()
            .expect("resolver guarantees the binding exists at this distance")
    }

    pub fn assign_at(&self, distance: usize, name: &str, value: Value) {
        self.ancestor(distance).0.borrow_mut().values.insert(name.to_string(), value);
    }

    /// Global lookup: chains through the frame's own parents up to (and
    /// including) the global frame, used for any variable the resolver
    /// did not record a distance for.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        let mut env = self.clone();
        loop {
            if let Some(v) = env.0.borrow().values.get(name) {
                return Some(v.clone());
            }
            let parent = env.0.borrow().parent.clone();
            match parent {
                Some(p) => env = p,
                None => return None,
            }
        }
    }

    pub fn assign_global(&self, name: &str, value: Value) -> bool {
        let mut env = self.clone();
        loop {
            if env.0.borrow().values.contains_key(name) {
                env.0.borrow_mut().values.insert(name.to_string(), value);
                return true;
            }
            let parent = env.0.borrow().parent.clone();
            match parent {
                Some(p) => env = p,
                None => return false,
            }
        }
    }
}
