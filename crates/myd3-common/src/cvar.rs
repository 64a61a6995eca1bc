// cvar.rs -- dynamic variable tracking

use std::collections::HashMap;

/// A console variable.
#[derive(Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub value: f32,
    pub modified: bool,
}

/// The cvar system context. The renderer registers its variables at startup
/// and snapshots their values once per frame; the console mutates them.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars.
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a cvar by name, returning its index.
    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.find_var_index(name).map(|i| &self.cvar_vars[i])
    }

    /// Registers a cvar with a default value, or returns the existing one.
    pub fn get_or_create(&mut self, name: &str, value: &str) -> usize {
        if let Some(i) = self.find_var_index(name) {
            return i;
        }
        let i = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            value: value.parse().unwrap_or(0.0),
            modified: true,
        });
        self.cvar_index.insert(name.to_string(), i);
        i
    }

    pub fn set_value(&mut self, name: &str, value: f32) {
        let i = self.get_or_create(name, &value.to_string());
        let var = &mut self.cvar_vars[i];
        var.string = value.to_string();
        var.value = value;
        var.modified = true;
    }

    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map(|v| v.value).unwrap_or(0.0)
    }

    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map(|v| v.string.as_str()).unwrap_or("")
    }
}
