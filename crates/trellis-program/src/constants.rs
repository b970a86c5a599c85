//! Constant pool for compiled programs
//!
//! Interns every value an instruction operand can reference by index:
//! - String literals (and stringified serializable payloads)
//! - Numbers
//! - Arrays of constant indices (including string arrays)
//! - Opaque locator handles from the resolver
//!
//! Each table has its own index space; the opcode consuming an operand
//! knows which table it refers to. Entries are never removed, so a
//! once-returned index stays valid for the lifetime of the pool.
//! Identical values are deduplicated; callers may not rely on that
//! (the contract only promises index stability).

use crate::error::{ProgramError, ProgramResult};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;

/// The four parallel tables needed to reconstruct a pool from persisted
/// output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantsSnapshot {
    pub strings: Vec<String>,
    pub arrays: Vec<Vec<u32>>,
    pub handles: Vec<serde_json::Value>,
    pub numbers: Vec<f64>,
}

pub struct Constants {
    strings: Vec<String>,
    arrays: Vec<Vec<u32>>,
    handles: Vec<serde_json::Value>,
    numbers: Vec<f64>,
    others: Vec<Box<dyn Any>>,
    lazy: bool,

    string_ids: HashMap<String, u32>,
    array_ids: HashMap<Vec<u32>, u32>,
    handle_ids: HashMap<String, u32>,
    number_ids: HashMap<u64, u32>,
}

impl Constants {
    /// A pool whose every entry can be persisted.
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// A pool that additionally accepts opaque in-memory values for
    /// same-process reuse. Refuses to serialize while any remain.
    pub fn lazy() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(lazy: bool) -> Self {
        Constants {
            strings: Vec::new(),
            arrays: Vec::new(),
            handles: Vec::new(),
            numbers: Vec::new(),
            others: Vec::new(),
            lazy,
            string_ids: HashMap::new(),
            array_ids: HashMap::new(),
            handle_ids: HashMap::new(),
            number_ids: HashMap::new(),
        }
    }

    pub fn string(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.string_ids.get(value) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.string_ids.insert(value.to_string(), id);
        id
    }

    pub fn number(&mut self, value: f64) -> u32 {
        let key = value.to_bits();
        if let Some(&id) = self.number_ids.get(&key) {
            return id;
        }
        let id = self.numbers.len() as u32;
        self.numbers.push(value);
        self.number_ids.insert(key, id);
        id
    }

    pub fn array(&mut self, values: &[u32]) -> u32 {
        if let Some(&id) = self.array_ids.get(values) {
            return id;
        }
        let id = self.arrays.len() as u32;
        self.arrays.push(values.to_vec());
        self.array_ids.insert(values.to_vec(), id);
        id
    }

    /// Interns each string, then the array of their indices.
    pub fn string_array(&mut self, values: &[&str]) -> u32 {
        let ids: Vec<u32> = values.iter().map(|s| self.string(s)).collect();
        self.array(&ids)
    }

    /// Interns an opaque resolver locator payload.
    pub fn handle(&mut self, locator: &serde_json::Value) -> u32 {
        let key = locator.to_string();
        if let Some(&id) = self.handle_ids.get(&key) {
            return id;
        }
        let id = self.handles.len() as u32;
        self.handles.push(locator.clone());
        self.handle_ids.insert(key, id);
        id
    }

    /// Interns an arbitrary JSON-serializable value, stored stringified in
    /// the string table.
    pub fn serializable(&mut self, value: &serde_json::Value) -> u32 {
        let stringified = value.to_string();
        self.string(&stringified)
    }

    /// Interns an arbitrary in-memory value. Only available on a lazy pool;
    /// such entries cannot be persisted.
    pub fn other(&mut self, value: Box<dyn Any>) -> ProgramResult<u32> {
        if !self.lazy {
            return Err(ProgramError::OpaqueConstantInEagerPool);
        }
        let id = self.others.len() as u32;
        self.others.push(value);
        Ok(id)
    }

    pub fn get_other(&self, id: u32) -> Option<&dyn Any> {
        self.others.get(id as usize).map(Box::as_ref)
    }

    pub fn serialize(&self) -> ProgramResult<ConstantsSnapshot> {
        if !self.others.is_empty() {
            return Err(ProgramError::OpaqueConstantsPresent(self.others.len()));
        }
        Ok(ConstantsSnapshot {
            strings: self.strings.clone(),
            arrays: self.arrays.clone(),
            handles: self.handles.clone(),
            numbers: self.numbers.clone(),
        })
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only pool hydrated from a snapshot.
#[derive(Debug, Clone)]
pub struct RuntimeConstants {
    snapshot: ConstantsSnapshot,
}

impl RuntimeConstants {
    pub fn hydrate(snapshot: ConstantsSnapshot) -> Self {
        RuntimeConstants { snapshot }
    }

    pub fn get_string(&self, id: u32) -> ProgramResult<&str> {
        self.snapshot
            .strings
            .get(id as usize)
            .map(String::as_str)
            .ok_or(ProgramError::ConstantOutOfRange {
                table: "strings",
                index: id,
            })
    }

    pub fn get_number(&self, id: u32) -> ProgramResult<f64> {
        self.snapshot
            .numbers
            .get(id as usize)
            .copied()
            .ok_or(ProgramError::ConstantOutOfRange {
                table: "numbers",
                index: id,
            })
    }

    pub fn get_array(&self, id: u32) -> ProgramResult<&[u32]> {
        self.snapshot
            .arrays
            .get(id as usize)
            .map(Vec::as_slice)
            .ok_or(ProgramError::ConstantOutOfRange {
                table: "arrays",
                index: id,
            })
    }

    pub fn get_handle(&self, id: u32) -> ProgramResult<&serde_json::Value> {
        self.snapshot
            .handles
            .get(id as usize)
            .ok_or(ProgramError::ConstantOutOfRange {
                table: "handles",
                index: id,
            })
    }
}
