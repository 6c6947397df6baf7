//! Structural validation of incoming order documents.
//!
//! Validation runs on the untyped boundary document so that every defect is
//! reported at once, in a stable order, before the document is converted into
//! a typed [`Order`](order_types::Order).

use order_types::parse_decimal;
use rust_decimal::Decimal;
use serde_json::Value;

const REQUIRED_FIELDS: [&str; 4] = ["order_id", "customer_id", "items", "total_amount"];
const ITEM_REQUIRED_FIELDS: [&str; 3] = ["product_id", "quantity", "price"];

/// Validates an order document and returns every defect found.
///
/// An empty result means the document is valid. Rules never short-circuit
/// each other, except that a non-object item skips its own field checks.
pub fn validate(document: &Value) -> Vec<String> {
	let mut errors = Vec::new();

	for field in REQUIRED_FIELDS {
		if !document.get(field).is_some_and(is_truthy) {
			errors.push(format!("Missing required field: {}", field));
		}
	}

	if let Some(customer_id) = document.get("customer_id") {
		if is_truthy(customer_id) && !customer_id.is_string() {
			errors.push("customer_id must be a string".to_string());
		}
	}

	match document.get("items") {
		None => errors.push("Order must contain at least one item".to_string()),
		Some(Value::Array(items)) if items.is_empty() => {
			errors.push("Order must contain at least one item".to_string())
		},
		Some(Value::Array(items)) => {
			for (index, item) in items.iter().enumerate() {
				validate_item(index, item, &mut errors);
			}
		},
		Some(_) => errors.push("items must be a list".to_string()),
	}

	if let Some(total) = document.get("total_amount").filter(|v| !v.is_null()) {
		check_number("total_amount", total, Sign::NonNegative, &mut errors);
	}

	errors
}

fn validate_item(index: usize, item: &Value, errors: &mut Vec<String>) {
	let Some(fields) = item.as_object() else {
		errors.push(format!("Item {} must be an object", index));
		return;
	};

	for field in ITEM_REQUIRED_FIELDS {
		if !fields.contains_key(field) {
			errors.push(format!("Item {} missing required field: {}", index, field));
		}
	}

	if let Some(product_id) = fields.get("product_id") {
		if !product_id.is_string() && !product_id.is_number() {
			errors.push(format!("Item {} product_id must be a string", index));
		}
	}

	if let Some(quantity) = fields.get("quantity") {
		let label = format!("Item {} quantity", index);
		check_number(&label, quantity, Sign::Positive, errors);
	}

	if let Some(price) = fields.get("price") {
		let label = format!("Item {} price", index);
		check_number(&label, price, Sign::NonNegative, errors);
	}
}

#[derive(Clone, Copy)]
enum Sign {
	Positive,
	NonNegative,
}

/// Reports a defect for `value` unless it is a number of the required sign.
///
/// Numbers that parse as floats but do not fit an exact decimal (about
/// 7.9e28 in magnitude, or finer than 28 fractional digits) are out of range.
fn check_number(label: &str, value: &Value, sign: Sign, errors: &mut Vec<String>) {
	let Some(number) = parse_decimal(value) else {
		let finite = match value {
			Value::Number(_) => true,
			Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
			_ => false,
		};
		if finite {
			errors.push(format!("{} is out of range", label));
		} else {
			errors.push(format!("{} must be a number", label));
		}
		return;
	};

	match sign {
		Sign::Positive if number <= Decimal::ZERO => {
			errors.push(format!("{} must be positive", label))
		},
		Sign::NonNegative if number < Decimal::ZERO => {
			errors.push(format!("{} must be non-negative", label))
		},
		_ => {},
	}
}

/// Falsy values are null, false, zero, and empty strings, arrays or objects.
fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(_) => parse_decimal(value).is_none_or(|d| !d.is_zero()),
		Value::String(s) => !s.is_empty(),
		Value::Array(a) => !a.is_empty(),
		Value::Object(o) => !o.is_empty(),
	}
}
