//! Typed signal values and the static signal registry (spec §3, §4.1).
//!
//! A signal declaration is name + scope + domain + polarity + producing IR +
//! required inputs. The registry is static data; the kernel derives its DAG
//! from it (spec §4.1 step 2 "Trace").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    File,
    Module,
    Codebase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    HighIsGood,
    HighIsBad,
    Neutral,
}

/// The value domain a signal's values must lie within (spec §3 invariant:
/// "Every signal value lies within its declared domain").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Domain {
    UnitInterval,
    NonNegativeInt,
    NonNegativeFloat,
    Bool,
    Enum(&'static [&'static str]),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrStage {
    Ir0,
    Ir1,
    Ir2,
    Ir3,
    Ir4,
    Ir5t,
    Ir5s,
    Ir6,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDecl {
    pub name: &'static str,
    pub scope: Scope,
    pub domain: Domain,
    pub polarity: Polarity,
    pub producing_ir: IrStage,
    pub depends_on: &'static [&'static str],
}

/// A signal's actual value on one entity. `Null` models "not computed for
/// this entity" (e.g. `naming_drift` on a structural-stem file, spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Enum(String),
    Null,
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Int(i) => Some(*i as f64),
            SignalValue::Float(f) => Some(*f),
            SignalValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SignalValue::Null)
    }

    /// Clamp a float into `[0,1]` — used when writing composites / normalized
    /// inputs that must respect `UnitInterval` domain (spec §3: "out-of-domain
    /// inputs to composites are clamped and logged").
    pub fn clamped_unit(v: f64) -> Self {
        SignalValue::Float(v.clamp(0.0, 1.0))
    }
}

/// Per-entity, per-snapshot signal vector. Values are written exactly once
/// (spec §3 Lifecycles) — `set` panics on overwrite in debug builds via the
/// store's own guard (see `FactStore::set_signal`), not here.
#[derive(Debug, Default, Clone)]
pub struct SignalVector {
    values: HashMap<&'static str, SignalValue>,
}

impl SignalVector {
    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &'static str, value: SignalValue) {
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SignalValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

/// Keys the signal store by (entity, signal name).
pub type SignalKey = (EntityId, &'static str);
