//! Canonical transaction record, field identifiers and the raw-header mapping table.
//!
//! Every load tier produces the same shape: one [`Transaction`] per row with
//! all canonical fields present (absent values are `None`, never missing) and
//! any unmapped source columns carried as extension fields.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::data::{Value, format_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    TransactionId,
    Date,
    CustomerId,
    CustomerName,
    PhoneNumber,
    Gender,
    Age,
    ProductCategory,
    Tags,
    Quantity,
    PricePerUnit,
    DiscountPercentage,
    TotalAmount,
    FinalAmount,
    PaymentMethod,
    OrderStatus,
    DeliveryType,
    StoreId,
    StoreLocation,
    SalespersonId,
    EmployeeName,
    CustomerRegion,
    ProductId,
    ProductName,
    Brand,
    CustomerType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Timestamp,
    Integer,
    Decimal,
    Tags,
}

impl Field {
    pub const ALL: [Field; 26] = [
        Field::TransactionId,
        Field::Date,
        Field::CustomerId,
        Field::CustomerName,
        Field::PhoneNumber,
        Field::Gender,
        Field::Age,
        Field::ProductCategory,
        Field::Tags,
        Field::Quantity,
        Field::PricePerUnit,
        Field::DiscountPercentage,
        Field::TotalAmount,
        Field::FinalAmount,
        Field::PaymentMethod,
        Field::OrderStatus,
        Field::DeliveryType,
        Field::StoreId,
        Field::StoreLocation,
        Field::SalespersonId,
        Field::EmployeeName,
        Field::CustomerRegion,
        Field::ProductId,
        Field::ProductName,
        Field::Brand,
        Field::CustomerType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::TransactionId => "TransactionID",
            Field::Date => "Date",
            Field::CustomerId => "CustomerID",
            Field::CustomerName => "CustomerName",
            Field::PhoneNumber => "PhoneNumber",
            Field::Gender => "Gender",
            Field::Age => "Age",
            Field::ProductCategory => "ProductCategory",
            Field::Tags => "Tags",
            Field::Quantity => "Quantity",
            Field::PricePerUnit => "PricePerUnit",
            Field::DiscountPercentage => "DiscountPercentage",
            Field::TotalAmount => "TotalAmount",
            Field::FinalAmount => "FinalAmount",
            Field::PaymentMethod => "PaymentMethod",
            Field::OrderStatus => "OrderStatus",
            Field::DeliveryType => "DeliveryType",
            Field::StoreId => "StoreID",
            Field::StoreLocation => "StoreLocation",
            Field::SalespersonId => "SalespersonID",
            Field::EmployeeName => "EmployeeName",
            Field::CustomerRegion => "CustomerRegion",
            Field::ProductId => "ProductID",
            Field::ProductName => "ProductName",
            Field::Brand => "Brand",
            Field::CustomerType => "CustomerType",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Date => FieldKind::Timestamp,
            Field::Age | Field::Quantity => FieldKind::Integer,
            Field::PricePerUnit
            | Field::DiscountPercentage
            | Field::TotalAmount
            | Field::FinalAmount => FieldKind::Decimal,
            Field::Tags => FieldKind::Tags,
            _ => FieldKind::Text,
        }
    }

    /// Resolves a source header to its canonical field.
    ///
    /// Known raw variants and canonical names match exactly; anything else is
    /// retried ignoring case, spaces and underscores against the raw variants.
    pub fn from_header(header: &str) -> Option<Field> {
        let trimmed = header.trim();
        if let Some((_, field)) = COLUMN_MAPPING.iter().find(|(raw, _)| *raw == trimmed) {
            return Some(*field);
        }
        if let Ok(field) = trimmed.parse::<Field>() {
            return Some(field);
        }
        let key = header_key(trimmed);
        COLUMN_MAPPING
            .iter()
            .find(|(raw, _)| header_key(raw) == key)
            .map(|(_, field)| *field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == value)
            .ok_or_else(|| anyhow!("Unknown canonical field '{value}'"))
    }
}

/// Raw header variants seen across sources, mapped to their canonical field.
pub const COLUMN_MAPPING: &[(&str, Field)] = &[
    ("Transaction ID", Field::TransactionId),
    ("Date", Field::Date),
    ("Customer ID", Field::CustomerId),
    ("Customer Name", Field::CustomerName),
    ("Phone Number", Field::PhoneNumber),
    ("Gender", Field::Gender),
    ("Age", Field::Age),
    ("Product Category", Field::ProductCategory),
    ("Tags", Field::Tags),
    ("Quantity", Field::Quantity),
    ("Price per Unit", Field::PricePerUnit),
    ("Discount Percentage", Field::DiscountPercentage),
    ("Total Amount", Field::TotalAmount),
    ("Final Amount", Field::FinalAmount),
    ("Payment Method", Field::PaymentMethod),
    ("Order Status", Field::OrderStatus),
    ("Delivery Type", Field::DeliveryType),
    ("Store ID", Field::StoreId),
    ("Store Location", Field::StoreLocation),
    ("Salesperson ID", Field::SalespersonId),
    ("Employee name", Field::EmployeeName),
    ("Employee Name", Field::EmployeeName),
    ("Customer region", Field::CustomerRegion),
    ("Customer Region", Field::CustomerRegion),
    ("Product ID", Field::ProductId),
    ("Product Name", Field::ProductName),
    ("Brand", Field::Brand),
    ("Customer Type", Field::CustomerType),
];

fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Borrowed view of one field's value, used for sorting and rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Text(&'a str),
    Timestamp(&'a NaiveDateTime),
    Integer(i64),
    Decimal(&'a Decimal),
    Tags(&'a [String]),
    Extension(&'a Value),
}

impl FieldValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_display(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => (*s).to_string(),
            FieldValue::Timestamp(ts) => format_timestamp(ts),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Decimal(d) => d.normalize().to_string(),
            FieldValue::Tags(tags) => tags.join(", "),
            FieldValue::Extension(value) => value.as_display(),
        }
    }
}

impl Serialize for FieldValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Decimal(d) => match d.to_f64() {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.serialize_none(),
            },
            FieldValue::Tags(tags) => tags.serialize(serializer),
            FieldValue::Extension(Value::String(s)) => serializer.serialize_str(s),
            FieldValue::Extension(Value::Integer(i)) => serializer.serialize_i64(*i),
            FieldValue::Extension(Value::Float(f)) => serializer.serialize_f64(*f),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub transaction_id: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub product_category: Option<String>,
    pub tags: Vec<String>,
    pub quantity: Option<i64>,
    pub price_per_unit: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub final_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub order_status: Option<String>,
    pub delivery_type: Option<String>,
    pub store_id: Option<String>,
    pub store_location: Option<String>,
    pub salesperson_id: Option<String>,
    pub employee_name: Option<String>,
    pub customer_region: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub customer_type: Option<String>,
    /// Unmapped source columns, keyed by their original header.
    pub extensions: BTreeMap<String, Option<Value>>,
}

impl Transaction {
    pub fn text(&self, field: Field) -> Option<&str> {
        self.text_slot(field).and_then(|slot| slot.as_deref())
    }

    pub fn text_slot(&self, field: Field) -> Option<&Option<String>> {
        let slot = match field {
            Field::TransactionId => &self.transaction_id,
            Field::CustomerId => &self.customer_id,
            Field::CustomerName => &self.customer_name,
            Field::PhoneNumber => &self.phone_number,
            Field::Gender => &self.gender,
            Field::ProductCategory => &self.product_category,
            Field::PaymentMethod => &self.payment_method,
            Field::OrderStatus => &self.order_status,
            Field::DeliveryType => &self.delivery_type,
            Field::StoreId => &self.store_id,
            Field::StoreLocation => &self.store_location,
            Field::SalespersonId => &self.salesperson_id,
            Field::EmployeeName => &self.employee_name,
            Field::CustomerRegion => &self.customer_region,
            Field::ProductId => &self.product_id,
            Field::ProductName => &self.product_name,
            Field::Brand => &self.brand,
            Field::CustomerType => &self.customer_type,
            _ => return None,
        };
        Some(slot)
    }

    pub fn text_slot_mut(&mut self, field: Field) -> Option<&mut Option<String>> {
        let slot = match field {
            Field::TransactionId => &mut self.transaction_id,
            Field::CustomerId => &mut self.customer_id,
            Field::CustomerName => &mut self.customer_name,
            Field::PhoneNumber => &mut self.phone_number,
            Field::Gender => &mut self.gender,
            Field::ProductCategory => &mut self.product_category,
            Field::PaymentMethod => &mut self.payment_method,
            Field::OrderStatus => &mut self.order_status,
            Field::DeliveryType => &mut self.delivery_type,
            Field::StoreId => &mut self.store_id,
            Field::StoreLocation => &mut self.store_location,
            Field::SalespersonId => &mut self.salesperson_id,
            Field::EmployeeName => &mut self.employee_name,
            Field::CustomerRegion => &mut self.customer_region,
            Field::ProductId => &mut self.product_id,
            Field::ProductName => &mut self.product_name,
            Field::Brand => &mut self.brand,
            Field::CustomerType => &mut self.customer_type,
            _ => return None,
        };
        Some(slot)
    }

    pub fn integer_slot_mut(&mut self, field: Field) -> Option<&mut Option<i64>> {
        match field {
            Field::Age => Some(&mut self.age),
            Field::Quantity => Some(&mut self.quantity),
            _ => None,
        }
    }

    pub fn decimal(&self, field: Field) -> Option<&Decimal> {
        match field {
            Field::PricePerUnit => self.price_per_unit.as_ref(),
            Field::DiscountPercentage => self.discount_percentage.as_ref(),
            Field::TotalAmount => self.total_amount.as_ref(),
            Field::FinalAmount => self.final_amount.as_ref(),
            _ => None,
        }
    }

    pub fn decimal_slot_mut(&mut self, field: Field) -> Option<&mut Option<Decimal>> {
        match field {
            Field::PricePerUnit => Some(&mut self.price_per_unit),
            Field::DiscountPercentage => Some(&mut self.discount_percentage),
            Field::TotalAmount => Some(&mut self.total_amount),
            Field::FinalAmount => Some(&mut self.final_amount),
            _ => None,
        }
    }

    pub fn get(&self, field: Field) -> FieldValue<'_> {
        match field.kind() {
            FieldKind::Text => self
                .text(field)
                .map_or(FieldValue::Null, FieldValue::Text),
            FieldKind::Timestamp => self
                .date
                .as_ref()
                .map_or(FieldValue::Null, FieldValue::Timestamp),
            FieldKind::Integer => {
                let value = if field == Field::Age {
                    self.age
                } else {
                    self.quantity
                };
                value.map_or(FieldValue::Null, FieldValue::Integer)
            }
            FieldKind::Decimal => self
                .decimal(field)
                .map_or(FieldValue::Null, FieldValue::Decimal),
            FieldKind::Tags => FieldValue::Tags(&self.tags),
        }
    }

    pub fn extension(&self, name: &str) -> FieldValue<'_> {
        match self.extensions.get(name) {
            Some(Some(value)) => FieldValue::Extension(value),
            _ => FieldValue::Null,
        }
    }
}

impl Serialize for Transaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::ALL.len() + self.extensions.len()))?;
        for field in Field::ALL {
            map.serialize_entry(field.name(), &self.get(field))?;
        }
        for name in self.extensions.keys() {
            map.serialize_entry(name, &self.extension(name))?;
        }
        map.end()
    }
}

/// Ordered, load-once collection of canonical records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Transaction>,
    extension_columns: Vec<String>,
}

impl Dataset {
    pub fn new(records: Vec<Transaction>, extension_columns: Vec<String>) -> Self {
        Self {
            records,
            extension_columns,
        }
    }

    pub fn records(&self) -> &[Transaction] {
        &self.records
    }

    pub fn extension_columns(&self) -> &[String] {
        &self.extension_columns
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extension_columns.iter().any(|column| column == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    #[test]
    fn mapping_table_covers_every_field() {
        for field in Field::ALL {
            assert!(
                COLUMN_MAPPING.iter().any(|(_, mapped)| *mapped == field),
                "{field} has no raw header variant"
            );
        }
    }

    #[test]
    fn raw_variants_and_canonical_names_resolve() {
        assert_eq!(Field::from_header("Employee name"), Some(Field::EmployeeName));
        assert_eq!(Field::from_header("Employee Name"), Some(Field::EmployeeName));
        assert_eq!(Field::from_header("Customer region"), Some(Field::CustomerRegion));
        assert_eq!(Field::from_header("Price per Unit"), Some(Field::PricePerUnit));
        for field in Field::ALL {
            assert_eq!(Field::from_header(field.name()), Some(field));
        }
    }

    #[test]
    fn header_fallback_ignores_case_and_separators() {
        assert_eq!(Field::from_header("Customer Id"), Some(Field::CustomerId));
        assert_eq!(Field::from_header("price_per_unit"), Some(Field::PricePerUnit));
        assert_eq!(Field::from_header("Loyalty Tier"), None);
    }

    #[test]
    fn serialize_emits_every_field_with_explicit_nulls() {
        let mut record = Transaction {
            transaction_id: Some("T-1".into()),
            date: NaiveDate::from_ymd_opt(2023, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            total_amount: Decimal::from_str("12.50").ok(),
            tags: vec!["sale".into()],
            ..Transaction::default()
        };
        record
            .extensions
            .insert("Loyalty Tier".into(), None);

        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), Field::ALL.len() + 1);
        assert_eq!(object["Date"], "2023-01-01T00:00:00.000Z");
        assert_eq!(object["TotalAmount"], 12.5);
        assert_eq!(object["Tags"], serde_json::json!(["sale"]));
        assert!(object["CustomerName"].is_null());
        assert!(object["Loyalty Tier"].is_null());
    }
}
