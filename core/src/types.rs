//! Named types referenced by command layouts.
//!
//! Builtin primitives have a fixed size on every revision and are never
//! emitted. Every other name becomes an inferred type whose size is learned
//! per revision from the layouts that reference it.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::revision::Revision;

/// Handle to a type owned by a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeId(usize);

/// Fixed-size primitive known a priori.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltinType {
    /// Display name such as `u32` or `f32`.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Type whose size is learned per revision.
///
/// A revision maps to `None` when the type was referenced there but its size
/// could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredType {
    pub name: String,
    pub sizes: BTreeMap<Revision, Option<u64>>,
}

impl InferredType {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sizes: BTreeMap::new(),
        }
    }

    /// Returns the recorded size on `revision`, if any.
    pub fn size_on(&self, revision: &Revision) -> Option<u64> {
        self.sizes.get(revision).copied().flatten()
    }

    /// Groups the recorded revisions into maximal runs of equal size, in
    /// revision order.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipc_schema_core::{Revision, TypeRegistry};
    ///
    /// let mut types = TypeRegistry::new();
    /// let id = types.get_or_create_inferred("nn::Uid");
    /// let r2: Revision = "2.0.0".parse().unwrap();
    /// let r3: Revision = "3.0.0".parse().unwrap();
    /// types.assert_size_on(id, &r2, Some(4)).unwrap();
    /// types.assert_size_on(id, &r3, Some(8)).unwrap();
    ///
    /// let runs = types.inferred(id).unwrap().size_runs();
    /// assert_eq!(runs, vec![(Some(4), vec![r2]), (Some(8), vec![r3])]);
    /// ```
    pub fn size_runs(&self) -> Vec<(Option<u64>, Vec<Revision>)> {
        let mut runs: Vec<(Option<u64>, Vec<Revision>)> = Vec::new();
        for (revision, size) in &self.sizes {
            match runs.last_mut() {
                Some((run_size, revisions)) if *run_size == *size => {
                    revisions.push(revision.clone());
                }
                _ => runs.push((*size, vec![revision.clone()])),
            }
        }
        runs
    }
}

/// A registered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    Builtin(BuiltinType),
    Inferred(InferredType),
}

impl TypeDef {
    /// Name used when rendering references to this type.
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(builtin) => &builtin.name,
            Self::Inferred(inferred) => &inferred.name,
        }
    }

    /// Builtins are part of the fixed vocabulary and never emitted.
    pub fn should_emit(&self) -> bool {
        matches!(self, Self::Inferred(_))
    }
}

/// Run-scoped registry of every type name seen during a merge.
///
/// Seeded with the builtin primitives. Each C spelling (`unsigned int`,
/// `int`) and the display name (`u32`) resolve to the same builtin.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::TypeRegistry;
///
/// let mut types = TypeRegistry::new();
/// let int = types.get_or_create_inferred("int");
/// assert_eq!(types.display_name(int), "u32");
/// assert!(!types.should_emit(int));
///
/// let uid = types.get_or_create_inferred("nn::account::Uid");
/// assert!(types.should_emit(uid));
/// assert_eq!(types.get_or_create_inferred("nn::account::Uid"), uid);
/// ```
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    defs: Vec<TypeDef>,
    by_name: HashMap<String, TypeId>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding only the builtin primitives.
    pub fn new() -> Self {
        let mut registry = Self {
            defs: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.add_builtin_int("char", 1);
        registry.add_builtin_int("short", 2);
        registry.add_builtin_int("int", 4);
        registry.add_builtin_int("long", 8);
        registry.add_builtin("float", 4, 'f');
        registry.add_builtin("bool", 1, 'b');
        registry
    }

    fn add_builtin_int(&mut self, name: &str, size: u64) {
        self.add_builtin(&format!("signed {name}"), size, 'i');
        self.add_builtin(&format!("unsigned {name}"), size, 'u');
        self.add_builtin(name, size, 'u');
    }

    fn add_builtin(&mut self, c_name: &str, size: u64, prefix: char) {
        let display = format!("{prefix}{}", size * 8);
        let id = match self.by_name.get(&display) {
            Some(&id) => id,
            None => {
                let id = TypeId(self.defs.len());
                self.defs.push(TypeDef::Builtin(BuiltinType {
                    name: display.clone(),
                    size,
                }));
                self.by_name.insert(display, id);
                id
            }
        };
        self.by_name.insert(c_name.to_string(), id);
    }

    /// Looks up a type by any of its names.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Returns the type named `name`, creating an inferred type with no known
    /// sizes if it does not exist yet.
    pub fn get_or_create_inferred(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = TypeId(self.defs.len());
        self.defs.push(TypeDef::Inferred(InferredType::new(name)));
        self.by_name.insert(name.to_string(), id);
        debug!(name, "Inferred new type");
        id
    }

    /// Returns the definition behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different registry.
    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.0]
    }

    /// Returns the inferred definition behind `id`, or `None` for builtins.
    pub fn inferred(&self, id: TypeId) -> Option<&InferredType> {
        match self.get(id) {
            TypeDef::Inferred(inferred) => Some(inferred),
            TypeDef::Builtin(_) => None,
        }
    }

    /// Name used when rendering references to `id`.
    pub fn display_name(&self, id: TypeId) -> &str {
        self.get(id).name()
    }

    pub fn should_emit(&self, id: TypeId) -> bool {
        self.get(id).should_emit()
    }

    /// Records that `id` is `size` bytes long on `revision`.
    ///
    /// An absent size only marks the type as seen on `revision`; it never
    /// clears a known size.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::SizeConflict`] when `size` contradicts a builtin's
    /// fixed size or a size already recorded for the same revision.
    pub fn assert_size_on(
        &mut self,
        id: TypeId,
        revision: &Revision,
        size: Option<u64>,
    ) -> Result<()> {
        match &mut self.defs[id.0] {
            TypeDef::Builtin(builtin) => match size {
                Some(size) if size != builtin.size => Err(SchemaError::SizeConflict {
                    name: builtin.name.clone(),
                    revision: revision.clone(),
                    existing: builtin.size,
                    asserted: size,
                }),
                _ => Ok(()),
            },
            TypeDef::Inferred(inferred) => {
                let slot = inferred.sizes.entry(revision.clone()).or_insert(None);
                match (*slot, size) {
                    (Some(existing), Some(asserted)) if existing != asserted => {
                        Err(SchemaError::SizeConflict {
                            name: inferred.name.clone(),
                            revision: revision.clone(),
                            existing,
                            asserted,
                        })
                    }
                    (None, Some(asserted)) => {
                        *slot = Some(asserted);
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Iterates over every distinct type in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(index, def)| (TypeId(index), def))
    }

    /// Inferred types with at least one recorded revision, ordered by
    /// (first revision, last revision, name).
    pub fn emitted_types(&self) -> Vec<&InferredType> {
        let mut types: Vec<&InferredType> = self
            .defs
            .iter()
            .filter_map(|def| match def {
                TypeDef::Inferred(inferred) if !inferred.sizes.is_empty() => Some(inferred),
                _ => None,
            })
            .collect();
        types.sort_by(|a, b| {
            let key_a = (a.sizes.keys().next(), a.sizes.keys().next_back(), &a.name);
            let key_b = (b.sizes.keys().next(), b.sizes.keys().next_back(), &b.name);
            key_a.cmp(&key_b)
        });
        types
    }
}
