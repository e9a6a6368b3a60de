use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use nativerpc_common::schema::MethodEntry;
use nativerpc_common::Result;

/// A registered service instance.
///
/// `invoke` dispatches on the method index assigned in declaration order,
/// the same order the schema lists the class's methods. The request value
/// has already been canonicalized through the method's request layout; the
/// returned value is canonicalized through the response layout before it
/// goes on the wire.
pub trait RpcService {
    fn invoke(&mut self, method_index: usize, request: Value) -> Result<Value>;
}

/// The three built-in `Metadata` methods, dispatched by direct reference
/// rather than by method index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMethod {
    ConnectClient,
    GetMetadata,
    CloseClient,
}

impl BuiltinMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connectClient" => Some(Self::ConnectClient),
            "getMetadata" => Some(Self::GetMetadata),
            "closeClient" => Some(Self::CloseClient),
            _ => None,
        }
    }
}

/// Target of one route: a user service invoked by method index, or a
/// built-in handled by the server itself.
#[derive(Clone)]
pub enum MethodTarget {
    User {
        service: Rc<RefCell<dyn RpcService>>,
        method_index: usize,
    },
    Builtin(BuiltinMethod),
}

/// The dispatch table built at server construction, keyed by
/// `Class.Method` route.
#[derive(Default)]
pub struct MethodTable {
    routes: HashMap<String, (MethodEntry, MethodTarget)>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: MethodEntry, target: MethodTarget) {
        self.routes.insert(entry.route(), (entry, target));
    }

    pub fn lookup(&self, route: &str) -> Option<&(MethodEntry, MethodTarget)> {
        self.routes.get(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativerpc_common::schema::{SchemaEntry, TypeRegistry};

    struct Echo;

    impl RpcService for Echo {
        fn invoke(&mut self, _method_index: usize, request: Value) -> Result<Value> {
            Ok(request)
        }
    }

    #[test]
    fn test_builtin_lookup_by_name() {
        assert_eq!(
            BuiltinMethod::from_name("connectClient"),
            Some(BuiltinMethod::ConnectClient)
        );
        assert_eq!(
            BuiltinMethod::from_name("getMetadata"),
            Some(BuiltinMethod::GetMetadata)
        );
        assert_eq!(BuiltinMethod::from_name("shutdown"), None);
    }

    #[test]
    fn test_table_routes_by_class_and_method() {
        let registry = TypeRegistry::from_entries(vec![
            SchemaEntry::method("Echo", "echo", "dict", "dict"),
            SchemaEntry::method("Echo", "again", "dict", "dict"),
        ])
        .unwrap();
        let service: Rc<RefCell<dyn RpcService>> = Rc::new(RefCell::new(Echo));

        let mut table = MethodTable::new();
        for entry in registry.methods_of("Echo").unwrap() {
            let target = MethodTarget::User {
                service: service.clone(),
                method_index: entry.method_index,
            };
            table.insert(entry, target);
        }

        assert_eq!(table.len(), 2);
        let (entry, _) = table.lookup("Echo.again").unwrap();
        assert_eq!(entry.method_index, 1);
        assert!(table.lookup("Echo.missing").is_none());
    }
}
