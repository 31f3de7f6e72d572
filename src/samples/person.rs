//! PersonService: a struct type, an array of it, and an in-memory store.

use super::{int_field, required, text_field};
use crate::error::{ConfigError, Fault};
use crate::operation::Operation;
use crate::service::ServiceBuilder;
use crate::types::{ComplexType, Compositor, Field};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const NAMESPACE: &str = "urn:PersonService";

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i64,
}

impl Person {
    fn new(id: i64, first_name: &str, last_name: &str, email: &str, age: i64) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            age,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::structure([
            ("id", Value::Int(self.id)),
            ("firstName", Value::from(self.first_name.as_str())),
            ("lastName", Value::from(self.last_name.as_str())),
            ("email", Value::from(self.email.as_str())),
            ("age", Value::Int(self.age)),
        ])
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            id: int_field(value, "id"),
            first_name: text_field(value, "firstName"),
            last_name: text_field(value, "lastName"),
            email: text_field(value, "email"),
            age: int_field(value, "age"),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.first_name.to_lowercase().contains(needle) || self.last_name.to_lowercase().contains(needle)
    }
}

/// Persons keyed by id.
#[derive(Debug, Default)]
pub struct PersonStore {
    persons: RwLock<BTreeMap<i64, Person>>,
}

impl PersonStore {
    /// Store holding the three demo persons.
    pub fn seeded() -> Self {
        let persons = [
            Person::new(1, "John", "Doe", "john@example.com", 30),
            Person::new(2, "Jane", "Smith", "jane@example.com", 25),
            Person::new(3, "Bob", "Johnson", "bob@example.com", 35),
        ];
        Self {
            persons: RwLock::new(persons.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub fn get(&self, id: i64) -> Option<Person> {
        self.persons.read().get(&id).cloned()
    }

    /// Store `person` under the next free id and return that id.
    pub fn create(&self, mut person: Person) -> i64 {
        let mut persons = self.persons.write();
        let id = persons.keys().next_back().map_or(1, |max| max + 1);
        person.id = id;
        persons.insert(id, person);
        id
    }

    pub fn all(&self) -> Vec<Person> {
        self.persons.read().values().cloned().collect()
    }

    /// Case-insensitive substring match on first or last name.
    pub fn search(&self, term: &str) -> Vec<Person> {
        let needle = term.to_lowercase();
        self.persons
            .read()
            .values()
            .filter(|p| p.matches(&needle))
            .cloned()
            .collect()
    }
}

pub fn builder() -> Result<ServiceBuilder, ConfigError> {
    builder_with(Arc::new(PersonStore::seeded()))
}

/// Service bound to an existing store.
pub fn builder_with(store: Arc<PersonStore>) -> Result<ServiceBuilder, ConfigError> {
    let get_store = Arc::clone(&store);
    let create_store = Arc::clone(&store);
    let all_store = Arc::clone(&store);
    let search_store = store;

    ServiceBuilder::new("PersonService", NAMESPACE)
        .complex_type(
            ComplexType::structure("Person", Compositor::All)
                .field(Field::new("id", "xsd:int"))
                .field(Field::new("firstName", "xsd:string"))
                .field(Field::new("lastName", "xsd:string"))
                .field(Field::new("email", "xsd:string"))
                .field(Field::new("age", "xsd:int")),
        )?
        .complex_type(ComplexType::array("PersonArray", "tns:Person"))?
        .register(
            Operation::new("getPerson")
                .rpc()
                .encoded()
                .input("id", "xsd:int")
                .output("return", "tns:Person")
                .documentation("Returns a person by their ID"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let id = required(&args, 0, "id")?.as_i64().unwrap_or_default();
                get_store.get(id).map(|p| p.to_value()).ok_or_else(|| {
                    Fault::client("Person not found").with_detail(format!("No person exists with ID: {}", id))
                })
            },
        )?
        .register(
            Operation::new("createPerson")
                .rpc()
                .encoded()
                .input("person", "tns:Person")
                .output("return", "xsd:int")
                .documentation("Creates a new person and returns the assigned ID"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let person = Person::from_value(required(&args, 0, "person")?);
                let id = create_store.create(person);
                debug!(id, "Person created");
                Ok(Value::Int(id))
            },
        )?
        .register(
            Operation::new("getAllPersons")
                .rpc()
                .encoded()
                .output("return", "tns:PersonArray")
                .documentation("Returns all persons in the system"),
            move |_args: Vec<Value>| -> Result<Value, Fault> {
                Ok(Value::list(all_store.all().iter().map(Person::to_value)))
            },
        )?
        .register(
            Operation::new("searchPersons")
                .rpc()
                .encoded()
                .input("searchTerm", "xsd:string")
                .output("return", "tns:PersonArray")
                .documentation("Searches for persons by name (first or last name)"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let term = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(Value::list(search_store.search(term).iter().map(Person::to_value)))
            },
        )
}
