// cvar.rs — dynamic variable tracking

use crate::common::com_printf;

use std::collections::HashMap;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: i32 {
        /// Only settable from the command line.
        const NOSET      = 0x02;
        /// Change takes effect at the next restart.
        const LATCH      = 0x04;
        /// Debug toggle.
        const CHEAT      = 0x08;
    }
}

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// The cvar table.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// Name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
        }
    }

    /// Names may not carry characters that break config or command parsing.
    pub fn validate_name(s: &str) -> bool {
        !s.is_empty() && !s.contains('\\') && !s.contains('"') && !s.contains(';') && !s.contains(' ')
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        match self.cvar_index.get(name) {
            Some(&idx) => Some(&mut self.cvar_vars[idx]),
            None => None,
        }
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    pub fn variable_bool(&self, name: &str) -> bool {
        self.variable_value(name) != 0.0
    }

    pub fn variable_int(&self, name: &str) -> i32 {
        self.variable_value(name) as i32
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: Option<&str>, flags: CvarFlags) -> Option<usize> {
        if !Self::validate_name(name) {
            com_printf(&format!("invalid cvar name \"{}\"\n", name));
            return None;
        }

        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return Some(idx);
        }

        let value = value?;

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);

        Some(idx)
    }

    /// Register a variable with a default. Existing values are kept.
    pub fn register(&mut self, name: &str, default: &str, flags: CvarFlags) {
        self.get(name, Some(default), flags);
    }

    fn set2(&mut self, name: &str, value: &str, force: bool, latch_active: bool) -> Option<usize> {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, Some(value), CvarFlags::empty()),
        };

        if !force {
            if self.cvar_vars[idx].flags.contains(CvarFlags::NOSET) {
                com_printf(&format!("{} is write protected.\n", name));
                return Some(idx);
            }

            if self.cvar_vars[idx].flags.contains(CvarFlags::LATCH) {
                if latch_active {
                    let var = &self.cvar_vars[idx];
                    let pending = var.latched_string.as_deref().unwrap_or(&var.string);
                    if value == pending {
                        return Some(idx);
                    }
                    com_printf(&format!("{} will be changed after restart.\n", name));
                    self.cvar_vars[idx].latched_string = Some(value.to_string());
                    return Some(idx);
                }
                // applied directly; a stale latch must not override it later
                self.cvar_vars[idx].latched_string = None;
            }
        } else {
            self.cvar_vars[idx].latched_string = None;
        }

        if value == self.cvar_vars[idx].string {
            return Some(idx);
        }

        let var = &mut self.cvar_vars[idx];
        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);

        Some(idx)
    }

    /// Set a cvar value (respects NOSET; LATCH applies immediately).
    pub fn set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, false, false)
    }

    /// Set while the subsystem that latches is running.
    pub fn set_latched(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, false, true)
    }

    /// Force-set a cvar value (ignores NOSET and LATCH).
    pub fn force_set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, true, false)
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Clear and return the modified flag of one variable.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_mut(name) {
            Some(var) => std::mem::replace(&mut var.modified, false),
            None => false,
        }
    }

    /// Apply `+set name value` pairs from a command line. NOSET variables
    /// may only be set this way, so these are forced.
    pub fn apply_command_line(&mut self, args: &[String]) {
        let mut i = 0;
        while i < args.len() {
            if args[i] == "+set" && i + 2 < args.len() {
                let name = &args[i + 1];
                let value = &args[i + 2];
                if self.find_var_index(name).is_some() {
                    self.force_set(name, value);
                } else {
                    self.get(name, Some(value), CvarFlags::empty());
                }
                i += 3;
                continue;
            }
            i += 1;
        }
    }
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

// ============================================================
// Tests
// ============================================================
