use std::collections::{HashMap, HashSet};

use crate::error::{Result, RpcError};

use super::entry::{is_primitive, primitive_size, ClassType, FieldSlot, MethodEntry, SchemaEntry};
use super::serializer::MAX_INSTANCE_SIZE;

/// The immutable catalogue of composite layouts and method signatures.
///
/// Built once per server/client from the parsed schema entries. Field order
/// within a composite is insertion order from the entry list and is the
/// canonical encoding order. Every type referenced by a field or method must
/// resolve to a primitive or a previously-listed composite.
#[derive(Debug)]
pub struct TypeRegistry {
    entries: Vec<SchemaEntry>,
    layouts: HashMap<String, Vec<FieldSlot>>,
    sizes: HashMap<String, usize>,
}

impl TypeRegistry {
    /// Builds the registry, validating the entry list.
    ///
    /// # Errors
    ///
    /// - [`RpcError::TypeNotFound`] when a field or method references a type
    ///   that is neither primitive nor a previously-listed composite
    /// - [`RpcError::EmptyComposite`] when a service class with no fields is
    ///   used as a data type
    /// - [`RpcError::SizeExceedsCeiling`] when a method request or response
    ///   type needs more than 1024 bytes of flat layout
    pub fn from_entries(entries: Vec<SchemaEntry>) -> Result<Self> {
        let field_classes: HashSet<&str> = entries
            .iter()
            .filter(|e| !e.is_method())
            .map(|e| e.class_name())
            .collect();
        let method_classes: HashSet<&str> = entries
            .iter()
            .filter(|e| e.is_method())
            .map(|e| e.class_name())
            .collect();

        let mut raw: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for entry in &entries {
            match entry {
                SchemaEntry::Field {
                    class_name,
                    field_name,
                    field_type,
                    ..
                } => {
                    if is_primitive(class_name) {
                        return Err(RpcError::Parse(format!("Type mismatch: {class_name}")));
                    }
                    if !is_primitive(field_type) && !raw.contains_key(field_type.as_str()) {
                        return Err(unknown_type(field_type, &field_classes, &method_classes));
                    }
                    raw.entry(class_name.clone())
                        .or_default()
                        .push((field_name.clone(), field_type.clone()));
                }
                SchemaEntry::Method {
                    request_type,
                    response_type,
                    ..
                } => {
                    for ty in [request_type, response_type] {
                        if !is_primitive(ty) && !raw.contains_key(ty.as_str()) {
                            return Err(unknown_type(ty, &field_classes, &method_classes));
                        }
                    }
                }
            }
        }

        let mut sizes = HashMap::new();
        for name in raw.keys() {
            resolve_size(name, &raw, &mut sizes, &mut Vec::new())?;
        }

        let layouts = raw
            .iter()
            .map(|(class, fields)| {
                let slots = fields
                    .iter()
                    .map(|(name, ty_name)| FieldSlot {
                        name: name.clone(),
                        ty: class_type_with_sizes(ty_name, &sizes),
                    })
                    .collect();
                (class.clone(), slots)
            })
            .collect();

        let registry = Self {
            entries,
            layouts,
            sizes,
        };

        for entry in &registry.entries {
            if let SchemaEntry::Method {
                request_type,
                response_type,
                ..
            } = entry
            {
                for ty in [request_type, response_type] {
                    let size = registry.size_of(ty)?;
                    if size > MAX_INSTANCE_SIZE {
                        return Err(RpcError::SizeExceedsCeiling(ty.clone(), size));
                    }
                }
            }
        }

        Ok(registry)
    }

    /// The full entry list, in insertion order, including appended built-ins.
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Resolves a type name. Primitives come from the catalogue; any other
    /// name is composite, with byte size 0 until its layout is known.
    pub fn find_type(&self, name: &str) -> ClassType {
        if let Some(ty) = ClassType::primitive(name) {
            return ty;
        }
        ClassType::composite(name, self.sizes.get(name).copied().unwrap_or(0))
    }

    pub fn is_composite(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    /// The flat layout of a composite, in declaration order.
    ///
    /// Fails for primitives and unknown types.
    pub fn fields_of(&self, class_name: &str) -> Result<&[FieldSlot]> {
        if is_primitive(class_name) {
            return Err(RpcError::Parse(format!("Type mismatch: {class_name}")));
        }
        self.layouts
            .get(class_name)
            .map(Vec::as_slice)
            .ok_or_else(|| RpcError::TypeNotFound(class_name.to_string()))
    }

    /// The methods of a class, with `method_index` assigned in declaration
    /// order. Fails when the class declares no methods.
    pub fn methods_of(&self, class_name: &str) -> Result<Vec<MethodEntry>> {
        let mut result = Vec::new();
        for entry in &self.entries {
            if let SchemaEntry::Method {
                class_name: class,
                method_name,
                request_type,
                response_type,
                id,
                ..
            } = entry
            {
                if class != class_name {
                    continue;
                }
                result.push(MethodEntry {
                    class_name: class.clone(),
                    method_name: method_name.clone(),
                    method_index: result.len(),
                    request_type: self.find_type(request_type),
                    response_type: self.find_type(response_type),
                    id: *id,
                });
            }
        }
        if result.is_empty() {
            return Err(RpcError::TypeNotFound(class_name.to_string()));
        }
        Ok(result)
    }

    /// Flat byte width of a type: catalogue width for primitives, transitive
    /// field sum for composites.
    pub fn size_of(&self, name: &str) -> Result<usize> {
        if let Some(width) = primitive_size(name) {
            return Ok(width);
        }
        self.sizes
            .get(name)
            .copied()
            .ok_or_else(|| RpcError::TypeNotFound(name.to_string()))
    }
}

fn unknown_type(
    name: &str,
    field_classes: &HashSet<&str>,
    method_classes: &HashSet<&str>,
) -> RpcError {
    if method_classes.contains(name) && !field_classes.contains(name) {
        RpcError::EmptyComposite(name.to_string())
    } else {
        RpcError::TypeNotFound(name.to_string())
    }
}

fn class_type_with_sizes(name: &str, sizes: &HashMap<String, usize>) -> ClassType {
    ClassType::primitive(name)
        .unwrap_or_else(|| ClassType::composite(name, sizes.get(name).copied().unwrap_or(0)))
}

fn resolve_size(
    name: &str,
    raw: &HashMap<String, Vec<(String, String)>>,
    sizes: &mut HashMap<String, usize>,
    stack: &mut Vec<String>,
) -> Result<usize> {
    if let Some(width) = primitive_size(name) {
        return Ok(width);
    }
    if let Some(&size) = sizes.get(name) {
        return Ok(size);
    }
    if stack.iter().any(|n| n == name) {
        return Err(RpcError::TypeNotFound(name.to_string()));
    }
    let fields = raw
        .get(name)
        .ok_or_else(|| RpcError::TypeNotFound(name.to_string()))?;
    stack.push(name.to_string());
    let mut total = 0;
    for (_, ty_name) in fields {
        total += resolve_size(ty_name, raw, sizes, stack)?;
    }
    stack.pop();
    sizes.insert(name.to_string(), total);
    Ok(total)
}
