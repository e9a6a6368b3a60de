//! Schema catalogue and serializer.
//!
//! The schema layer consumes the parser-produced list of entries (fields and
//! methods grouped by declaring class), derives a flat layout for every
//! composite type, and round-trips instances between that layout and the
//! JSON wire form.
//!
//! # Components
//!
//! - [`SchemaEntry`] - one parsed field or method declaration
//! - [`TypeRegistry`] - the immutable catalogue of layouts and signatures
//! - [`Serializer`] - instance creation, JSON conversion and teardown

mod entry;
mod registry;
mod serializer;

pub use entry::{
    is_primitive, list_message_files, load_project_schema, parse_schema_list, primitive_size,
    ClassType, FieldSlot, MethodEntry, SchemaEntry,
};
pub use registry::TypeRegistry;
pub use serializer::{Instance, Serializer, Slot, MAX_INSTANCE_SIZE, MIN_INSTANCE_CAPACITY};

/// Class name of the built-in introspection service.
pub const METADATA_CLASS: &str = "Metadata";

/// Project id used by the runtime's own health probes; excluded from
/// `getMetadata` client listings.
pub const SYSTEM_PROJECT_ID: &str = "nativerpc";

/// Schema entries for the built-in `Metadata` service, appended to the
/// parsed list by both server and client before the registry is built.
pub fn metadata_entries() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::method(METADATA_CLASS, "connectClient", "dict", "dict"),
        SchemaEntry::method(METADATA_CLASS, "getMetadata", "dict", "dict"),
        SchemaEntry::method(METADATA_CLASS, "closeClient", "dict", "dict"),
    ]
}
