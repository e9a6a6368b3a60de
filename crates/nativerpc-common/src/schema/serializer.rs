use std::rc::Rc;

use serde_json::{json, Value};

use crate::error::{Result, RpcError};

use super::entry::is_primitive;
use super::registry::TypeRegistry;

/// Largest flat layout an instance may occupy.
pub const MAX_INSTANCE_SIZE: usize = 1024;

/// Smallest instance capacity class; classes double up to [`MAX_INSTANCE_SIZE`].
pub const MIN_INSTANCE_CAPACITY: usize = 16;

/// One slot of an instance's flat layout.
///
/// Numeric and boolean slots hold their value inline; `str`, `dict` and
/// `list` slots own their heap storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    Dict(Value),
    List(Value),
}

impl Slot {
    fn default_for(ty: &str) -> Option<Slot> {
        let slot = match ty {
            "int" => Slot::Int(0),
            "float" => Slot::Float(0.0),
            "bool" => Slot::Bool(false),
            "str" => Slot::Str(String::new()),
            "dict" => Slot::Dict(json!({})),
            "list" => Slot::List(json!([])),
            _ => return None,
        };
        Some(slot)
    }
}

/// One message instance: the flat slot sequence of a type, with its byte
/// size and power-of-two capacity class.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_name: String,
    slots: Vec<Slot>,
    byte_size: usize,
    capacity: usize,
}

impl Instance {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Converts instances between the flat layout and the JSON wire form.
///
/// Composite fields are visited in declaration order, so the slot sequence
/// of an instance matches the byte order of the layout and the key order of
/// the wire form.
///
/// # Example
///
/// ```
/// use nativerpc_common::schema::{SchemaEntry, Serializer, TypeRegistry};
/// use serde_json::json;
/// use std::rc::Rc;
///
/// let registry = Rc::new(TypeRegistry::from_entries(vec![
///     SchemaEntry::field("Msg", "a", "int"),
/// ]).unwrap());
/// let serializer = Serializer::new(registry);
///
/// let mut instance = serializer.create_instance("Msg").unwrap();
/// serializer.from_json("Msg", &json!({"a": 7}), &mut instance).unwrap();
/// let value = serializer.destroy_and_get("Msg", instance).unwrap();
/// assert_eq!(value, json!({"a": 7}));
/// ```
#[derive(Debug, Clone)]
pub struct Serializer {
    registry: Rc<TypeRegistry>,
}

impl Serializer {
    pub fn new(registry: Rc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Flat byte width of a type, transitive over composite fields.
    pub fn size_of(&self, type_name: &str) -> Result<usize> {
        self.registry.size_of(type_name)
    }

    /// Creates a default-initialized instance of `class_name`.
    ///
    /// Numerics start at zero, bools false, strings and json values empty.
    /// Capacity is the smallest power-of-two class holding the byte size;
    /// types over [`MAX_INSTANCE_SIZE`] are rejected.
    pub fn create_instance(&self, class_name: &str) -> Result<Instance> {
        let byte_size = self.registry.size_of(class_name)?;
        let capacity = instance_capacity(class_name, byte_size)?;
        let mut slots = Vec::new();
        self.push_default_slots(class_name, &mut slots)?;
        Ok(Instance {
            type_name: class_name.to_string(),
            slots,
            byte_size,
            capacity,
        })
    }

    /// Decodes an instance into its JSON wire form.
    ///
    /// Primitives map to their JSON scalar; composites become objects whose
    /// keys are the declared field names in declaration order.
    pub fn to_json(&self, type_name: &str, instance: &Instance) -> Result<Value> {
        self.check_instance_type(type_name, instance)?;
        let mut cursor = 0;
        let value = self.encode(type_name, &instance.slots, &mut cursor)?;
        if cursor != instance.slots.len() {
            return Err(RpcError::Parse(format!(
                "Instance size mismatch: {type_name}"
            )));
        }
        Ok(value)
    }

    /// Fills an instance from its JSON wire form.
    ///
    /// Fields missing from the JSON object keep their default slot value;
    /// undeclared keys are dropped.
    pub fn from_json(&self, type_name: &str, data: &Value, instance: &mut Instance) -> Result<()> {
        self.check_instance_type(type_name, instance)?;
        let mut cursor = 0;
        self.decode(type_name, data, &mut instance.slots, &mut cursor)
    }

    /// Releases an instance's variable-width members and clears it.
    pub fn destroy_instance(&self, class_name: &str, instance: &mut Instance) -> Result<()> {
        self.check_instance_type(class_name, instance)?;
        instance.slots.clear();
        instance.byte_size = 0;
        Ok(())
    }

    /// Decodes an instance to JSON, then destroys it.
    pub fn destroy_and_get(&self, class_name: &str, mut instance: Instance) -> Result<Value> {
        let value = self.to_json(class_name, &instance)?;
        self.destroy_instance(class_name, &mut instance)?;
        Ok(value)
    }

    fn check_instance_type(&self, type_name: &str, instance: &Instance) -> Result<()> {
        if instance.type_name != type_name {
            return Err(RpcError::Parse(format!(
                "Instance type mismatch: {} is not {type_name}",
                instance.type_name
            )));
        }
        Ok(())
    }

    fn push_default_slots(&self, ty: &str, out: &mut Vec<Slot>) -> Result<()> {
        if let Some(slot) = Slot::default_for(ty) {
            out.push(slot);
            return Ok(());
        }
        for field in self.registry.fields_of(ty)? {
            self.push_default_slots(&field.ty.name, out)?;
        }
        Ok(())
    }

    fn encode(&self, ty: &str, slots: &[Slot], cursor: &mut usize) -> Result<Value> {
        if is_primitive(ty) {
            let slot = slots
                .get(*cursor)
                .ok_or_else(|| RpcError::Parse(format!("Instance size mismatch: {ty}")))?;
            *cursor += 1;
            return match (ty, slot) {
                ("int", Slot::Int(v)) => Ok(json!(*v)),
                ("float", Slot::Float(v)) => Ok(json!(*v)),
                ("bool", Slot::Bool(v)) => Ok(json!(*v)),
                ("str", Slot::Str(v)) => Ok(Value::String(v.clone())),
                ("dict", Slot::Dict(v)) => Ok(v.clone()),
                ("list", Slot::List(v)) => Ok(v.clone()),
                _ => Err(RpcError::Parse(format!("Slot mismatch for {ty}"))),
            };
        }
        let mut map = serde_json::Map::new();
        for field in self.registry.fields_of(ty)? {
            map.insert(
                field.name.clone(),
                self.encode(&field.ty.name, slots, cursor)?,
            );
        }
        Ok(Value::Object(map))
    }

    fn decode(&self, ty: &str, data: &Value, slots: &mut [Slot], cursor: &mut usize) -> Result<()> {
        if is_primitive(ty) {
            let slot = slots
                .get_mut(*cursor)
                .ok_or_else(|| RpcError::Parse(format!("Instance size mismatch: {ty}")))?;
            *cursor += 1;
            *slot = match ty {
                "int" => Slot::Int(data.as_i64().ok_or_else(|| mismatch(ty, data))? as i32),
                "float" => Slot::Float(data.as_f64().ok_or_else(|| mismatch(ty, data))? as f32),
                "bool" => Slot::Bool(data.as_bool().ok_or_else(|| mismatch(ty, data))?),
                "str" => Slot::Str(data.as_str().ok_or_else(|| mismatch(ty, data))?.to_string()),
                "dict" => {
                    if !data.is_object() {
                        return Err(mismatch(ty, data));
                    }
                    Slot::Dict(data.clone())
                }
                "list" => {
                    if !data.is_array() {
                        return Err(mismatch(ty, data));
                    }
                    Slot::List(data.clone())
                }
                _ => return Err(RpcError::TypeNotFound(ty.to_string())),
            };
            return Ok(());
        }

        let object = data
            .as_object()
            .ok_or_else(|| RpcError::Parse(format!("Expected object for {ty}")))?;
        for field in self.registry.fields_of(ty)? {
            match object.get(&field.name) {
                Some(value) => self.decode(&field.ty.name, value, slots, cursor)?,
                None => self.skip(&field.ty.name, cursor)?,
            }
        }
        Ok(())
    }

    fn skip(&self, ty: &str, cursor: &mut usize) -> Result<()> {
        *cursor += self.slot_count(ty)?;
        Ok(())
    }

    fn slot_count(&self, ty: &str) -> Result<usize> {
        if is_primitive(ty) {
            return Ok(1);
        }
        let mut total = 0;
        for field in self.registry.fields_of(ty)? {
            total += self.slot_count(&field.ty.name)?;
        }
        Ok(total)
    }
}

fn mismatch(ty: &str, data: &Value) -> RpcError {
    RpcError::Parse(format!("Field type mismatch: expected {ty}, got {data}"))
}

fn instance_capacity(class_name: &str, byte_size: usize) -> Result<usize> {
    let mut capacity = MIN_INSTANCE_CAPACITY;
    while capacity < byte_size {
        capacity *= 2;
    }
    if capacity > MAX_INSTANCE_SIZE {
        return Err(RpcError::SizeExceedsCeiling(
            class_name.to_string(),
            byte_size,
        ));
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaEntry;

    fn serializer(entries: Vec<SchemaEntry>) -> Serializer {
        Serializer::new(Rc::new(TypeRegistry::from_entries(entries).unwrap()))
    }

    fn message_serializer() -> Serializer {
        serializer(vec![
            SchemaEntry::field("Msg", "a", "int"),
            SchemaEntry::field("Msg", "b", "str"),
            SchemaEntry::field("Msg", "c", "bool"),
        ])
    }

    #[test]
    fn test_primitive_round_trip() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("Msg").unwrap();
        serializer
            .from_json("Msg", &json!({"a": 7, "b": "hi", "c": true}), &mut instance)
            .unwrap();

        let value = serializer.to_json("Msg", &instance).unwrap();
        assert_eq!(value, json!({"a": 7, "b": "hi", "c": true}));

        let expected = serializer.size_of("int").unwrap()
            + serializer.size_of("str").unwrap()
            + serializer.size_of("bool").unwrap();
        assert_eq!(serializer.size_of("Msg").unwrap(), expected);
    }

    #[test]
    fn test_default_instance_has_declared_keys() {
        let serializer = message_serializer();
        let instance = serializer.create_instance("Msg").unwrap();
        let value = serializer.to_json("Msg", &instance).unwrap();
        assert_eq!(value, json!({"a": 0, "b": "", "c": false}));
    }

    #[test]
    fn test_missing_fields_keep_defaults() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("Msg").unwrap();
        serializer
            .from_json("Msg", &json!({"b": "only"}), &mut instance)
            .unwrap();
        let value = serializer.to_json("Msg", &instance).unwrap();
        assert_eq!(value, json!({"a": 0, "b": "only", "c": false}));
    }

    #[test]
    fn test_undeclared_fields_dropped() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("Msg").unwrap();
        serializer
            .from_json("Msg", &json!({"a": 1, "b": "x", "c": true, "zz": 9}), &mut instance)
            .unwrap();
        let value = serializer.to_json("Msg", &instance).unwrap();
        assert_eq!(value, json!({"a": 1, "b": "x", "c": true}));
    }

    #[test]
    fn test_round_trip_is_bytewise_equivalent() {
        let serializer = message_serializer();
        let mut first = serializer.create_instance("Msg").unwrap();
        serializer
            .from_json("Msg", &json!({"a": 42, "b": "hey", "c": true}), &mut first)
            .unwrap();

        let wire = serializer.to_json("Msg", &first).unwrap();
        let mut second = serializer.create_instance("Msg").unwrap();
        serializer.from_json("Msg", &wire, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_composite_round_trip() {
        let serializer = serializer(vec![
            SchemaEntry::field("Inner", "x", "int"),
            SchemaEntry::field("Inner", "y", "str"),
            SchemaEntry::field("Outer", "inner", "Inner"),
            SchemaEntry::field("Outer", "tags", "list"),
        ]);

        let mut instance = serializer.create_instance("Outer").unwrap();
        let data = json!({"inner": {"x": 3, "y": "deep"}, "tags": [1, "two"]});
        serializer.from_json("Outer", &data, &mut instance).unwrap();
        assert_eq!(serializer.to_json("Outer", &instance).unwrap(), data);
    }

    #[test]
    fn test_dict_instance_passthrough() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("dict").unwrap();
        serializer
            .from_json("dict", &json!({"free": ["form", 1]}), &mut instance)
            .unwrap();
        let value = serializer.destroy_and_get("dict", instance).unwrap();
        assert_eq!(value, json!({"free": ["form", 1]}));
    }

    #[test]
    fn test_capacity_classes() {
        let serializer = message_serializer();
        // 13 bytes round up to the smallest class.
        assert_eq!(serializer.create_instance("Msg").unwrap().capacity(), 16);
        assert_eq!(serializer.create_instance("dict").unwrap().capacity(), 16);

        let entries: Vec<_> = (0..5)
            .map(|i| SchemaEntry::field("Five", format!("f{i}"), "str"))
            .collect();
        let five = self::serializer(entries);
        let instance = five.create_instance("Five").unwrap();
        assert_eq!(instance.byte_size(), 40);
        assert_eq!(instance.capacity(), 64);
    }

    #[test]
    fn test_create_over_ceiling_fails() {
        let entries: Vec<_> = (0..129)
            .map(|i| SchemaEntry::field("Wide", format!("f{i}"), "str"))
            .collect();
        let serializer = serializer(entries);
        assert!(matches!(
            serializer.create_instance("Wide"),
            Err(RpcError::SizeExceedsCeiling(name, 1032)) if name == "Wide"
        ));
    }

    #[test]
    fn test_field_type_mismatch_fails() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("Msg").unwrap();
        let result = serializer.from_json("Msg", &json!({"a": "seven"}), &mut instance);
        assert!(matches!(result, Err(RpcError::Parse(_))));
    }

    #[test]
    fn test_destroy_clears_instance() {
        let serializer = message_serializer();
        let mut instance = serializer.create_instance("Msg").unwrap();
        serializer.destroy_instance("Msg", &mut instance).unwrap();
        assert_eq!(instance.byte_size(), 0);
    }

    #[test]
    fn test_unknown_type_fails() {
        let serializer = message_serializer();
        assert!(matches!(
            serializer.create_instance("Mystery"),
            Err(RpcError::TypeNotFound(_))
        ));
    }
}
