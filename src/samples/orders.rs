//! OrderService: nested structs, arrays inside structs and an operation
//! with several output parts.

use super::{float_field, int_field, required, text_field};
use crate::error::{ConfigError, Fault};
use crate::operation::Operation;
use crate::service::ServiceBuilder;
use crate::types::{ComplexType, Compositor, Field};
use crate::value::Value;
use chrono::{Local, SecondsFormat};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const NAMESPACE: &str = "urn:OrderService";

/// Sales tax applied to every subtotal.
pub const TAX_RATE: f64 = 0.08;

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl Address {
    fn new(street: &str, city: &str, state: &str, zip_code: &str, country: &str) -> Self {
        Self {
            street: street.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            zip_code: zip_code.to_string(),
            country: country.to_string(),
        }
    }

    fn to_value(&self) -> Value {
        Value::structure([
            ("street", Value::from(self.street.as_str())),
            ("city", Value::from(self.city.as_str())),
            ("state", Value::from(self.state.as_str())),
            ("zipCode", Value::from(self.zip_code.as_str())),
            ("country", Value::from(self.country.as_str())),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub billing_address: Address,
    pub shipping_address: Address,
}

impl Customer {
    fn to_value(&self) -> Value {
        Value::structure([
            ("id", Value::Int(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("email", Value::from(self.email.as_str())),
            ("billingAddress", self.billing_address.to_value()),
            ("shippingAddress", self.shipping_address.to_value()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    /// Filled in by the service; callers may leave it out.
    pub total_price: Option<f64>,
}

impl OrderItem {
    fn new(product_id: i64, product_name: &str, quantity: i64, unit_price: f64) -> Self {
        Self {
            product_id,
            product_name: product_name.to_string(),
            quantity,
            unit_price,
            total_price: None,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    fn priced(mut self) -> Self {
        self.total_price = Some(self.line_total());
        self
    }

    fn to_value(&self) -> Value {
        Value::structure([
            ("productId", Value::Int(self.product_id)),
            ("productName", Value::from(self.product_name.as_str())),
            ("quantity", Value::Int(self.quantity)),
            ("unitPrice", Value::Float(self.unit_price)),
            ("totalPrice", self.total_price.map_or(Value::Absent, Value::Float)),
        ])
    }

    fn from_value(value: &Value) -> Self {
        Self {
            product_id: int_field(value, "productId"),
            product_name: text_field(value, "productName"),
            quantity: int_field(value, "quantity"),
            unit_price: float_field(value, "unitPrice"),
            total_price: value.get("totalPrice").and_then(Value::as_f64),
        }
    }
}

/// Subtotal, tax and total for a set of items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl Totals {
    pub fn of(items: &[OrderItem]) -> Self {
        let subtotal: f64 = items.iter().map(OrderItem::line_total).sum();
        let tax = subtotal * TAX_RATE;
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }

    fn to_value(self) -> Value {
        Value::structure([
            ("subtotal", Value::Float(self.subtotal)),
            ("tax", Value::Float(self.tax)),
            ("total", Value::Float(self.total)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: i64,
    pub order_date: String,
    pub status: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
}

impl Order {
    pub fn to_value(&self) -> Value {
        Value::structure([
            ("orderId", Value::Int(self.order_id)),
            ("orderDate", Value::from(self.order_date.as_str())),
            ("status", Value::from(self.status.as_str())),
            ("customer", self.customer.to_value()),
            ("items", Value::list(self.items.iter().map(OrderItem::to_value))),
            ("subtotal", Value::Float(self.totals.subtotal)),
            ("tax", Value::Float(self.totals.tax)),
            ("total", Value::Float(self.totals.total)),
        ])
    }
}

/// Customers and orders keyed by id.
#[derive(Debug)]
pub struct OrderStore {
    customers: BTreeMap<i64, Customer>,
    orders: RwLock<BTreeMap<i64, Order>>,
}

impl OrderStore {
    /// One customer with one shipped order.
    pub fn seeded() -> Self {
        let acme = Customer {
            id: 1,
            name: "Acme Corporation".to_string(),
            email: "orders@acme.com".to_string(),
            billing_address: Address::new("123 Main St", "New York", "NY", "10001", "USA"),
            shipping_address: Address::new("456 Warehouse Ave", "Newark", "NJ", "07102", "USA"),
        };
        let items = vec![
            OrderItem::new(101, "Widget A", 5, 10.0).priced(),
            OrderItem::new(102, "Widget B", 3, 25.0).priced(),
        ];
        let order = Order {
            order_id: 1001,
            order_date: "2024-01-15T10:30:00".to_string(),
            status: "shipped".to_string(),
            customer: acme.clone(),
            items,
            totals: Totals {
                subtotal: 125.0,
                tax: 10.0,
                total: 135.0,
            },
        };

        Self {
            customers: BTreeMap::from([(acme.id, acme)]),
            orders: RwLock::new(BTreeMap::from([(order.order_id, order)])),
        }
    }

    pub fn order(&self, id: i64) -> Option<Order> {
        self.orders.read().get(&id).cloned()
    }

    pub fn customer_orders(&self, customer_id: i64) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| o.customer.id == customer_id)
            .cloned()
            .collect()
    }

    /// Price the items and store a pending order for the customer.
    pub fn create(&self, customer_id: i64, items: Vec<OrderItem>) -> Option<Order> {
        let customer = self.customers.get(&customer_id)?.clone();
        let items: Vec<OrderItem> = items.into_iter().map(OrderItem::priced).collect();
        let totals = Totals::of(&items);

        let mut orders = self.orders.write();
        let order_id = orders.keys().next_back().map_or(1, |max| max + 1);
        let order = Order {
            order_id,
            order_date: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            status: "pending".to_string(),
            customer,
            items,
            totals,
        };
        orders.insert(order_id, order.clone());
        Some(order)
    }
}

fn items_arg(args: &[Value], index: usize) -> Vec<OrderItem> {
    args.get(index)
        .and_then(Value::as_list)
        .map(|items| items.iter().map(OrderItem::from_value).collect())
        .unwrap_or_default()
}

pub fn builder() -> Result<ServiceBuilder, ConfigError> {
    builder_with(Arc::new(OrderStore::seeded()))
}

/// Service bound to an existing store.
pub fn builder_with(store: Arc<OrderStore>) -> Result<ServiceBuilder, ConfigError> {
    let get_store = Arc::clone(&store);
    let list_store = Arc::clone(&store);
    let create_store = store;

    ServiceBuilder::new("OrderService", NAMESPACE)
        .complex_type(
            ComplexType::structure("Address", Compositor::All)
                .field(Field::new("street", "xsd:string"))
                .field(Field::new("city", "xsd:string"))
                .field(Field::new("state", "xsd:string"))
                .field(Field::new("zipCode", "xsd:string"))
                .field(Field::new("country", "xsd:string")),
        )?
        .complex_type(
            ComplexType::structure("Customer", Compositor::All)
                .field(Field::new("id", "xsd:int"))
                .field(Field::new("name", "xsd:string"))
                .field(Field::new("email", "xsd:string"))
                .field(Field::new("billingAddress", "tns:Address"))
                .field(Field::new("shippingAddress", "tns:Address")),
        )?
        .complex_type(
            ComplexType::structure("OrderItem", Compositor::All)
                .field(Field::new("productId", "xsd:int"))
                .field(Field::new("productName", "xsd:string"))
                .field(Field::new("quantity", "xsd:int"))
                .field(Field::new("unitPrice", "xsd:float"))
                .field(Field::new("totalPrice", "xsd:float").optional()),
        )?
        .complex_type(ComplexType::array("OrderItemArray", "tns:OrderItem"))?
        .complex_type(
            ComplexType::structure("Order", Compositor::All)
                .field(Field::new("orderId", "xsd:int"))
                .field(Field::new("orderDate", "xsd:string"))
                .field(Field::new("status", "xsd:string"))
                .field(Field::new("customer", "tns:Customer"))
                .field(Field::new("items", "tns:OrderItemArray"))
                .field(Field::new("subtotal", "xsd:float"))
                .field(Field::new("tax", "xsd:float"))
                .field(Field::new("total", "xsd:float")),
        )?
        .complex_type(ComplexType::array("OrderArray", "tns:Order"))?
        .register(
            Operation::new("getOrder")
                .rpc()
                .encoded()
                .input("orderId", "xsd:int")
                .output("return", "tns:Order")
                .documentation("Returns an order by ID"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let id = required(&args, 0, "orderId")?.as_i64().unwrap_or_default();
                get_store.order(id).map(|o| o.to_value()).ok_or_else(|| {
                    Fault::client("Order not found").with_detail(format!("No order exists with ID: {}", id))
                })
            },
        )?
        .register(
            Operation::new("getCustomerOrders")
                .rpc()
                .encoded()
                .input("customerId", "xsd:int")
                .output("return", "tns:OrderArray")
                .documentation("Returns all orders for a customer"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let id = required(&args, 0, "customerId")?.as_i64().unwrap_or_default();
                Ok(Value::list(list_store.customer_orders(id).iter().map(Order::to_value)))
            },
        )?
        .register(
            Operation::new("createOrder")
                .rpc()
                .encoded()
                .input("customerId", "xsd:int")
                .input("items", "tns:OrderItemArray")
                .output("return", "tns:Order")
                .documentation("Creates a new order"),
            move |args: Vec<Value>| -> Result<Value, Fault> {
                let customer_id = required(&args, 0, "customerId")?.as_i64().unwrap_or_default();
                let order = create_store
                    .create(customer_id, items_arg(&args, 1))
                    .ok_or_else(|| {
                        Fault::client("Customer not found")
                            .with_detail(format!("No customer exists with ID: {}", customer_id))
                    })?;
                debug!(order_id = order.order_id, customer_id, "Order created");
                Ok(order.to_value())
            },
        )?
        .register(
            Operation::new("calculateOrderTotal")
                .rpc()
                .encoded()
                .input("items", "tns:OrderItemArray")
                .output("subtotal", "xsd:float")
                .output("tax", "xsd:float")
                .output("total", "xsd:float")
                .documentation("Calculates the total for given order items"),
            |args: Vec<Value>| -> Result<Value, Fault> { Ok(Totals::of(&items_arg(&args, 0)).to_value()) },
        )
}
