use serde_json::{Map, Value};

use crate::domain::action::{Action, Amount, ACCOUNT_ID_PREFIX};
use crate::errors::ActionError;

/// Turns a decoded agent object into a well-formed [`Action`].
///
/// Checks run in a fixed order: shape, type tag, amount, then the fields of
/// the selected variant.
pub fn validate_action(value: &Value) -> Result<Action, ActionError> {
    let object = value.as_object().ok_or(ActionError::InvalidShape)?;

    let action_type = object.get("type").and_then(Value::as_str);
    if !matches!(action_type, Some("payment_link" | "connect_payment")) {
        return Err(ActionError::UnknownActionType);
    }

    let amount = coerce_amount(object.get("amount"))?;

    match action_type {
        Some("payment_link") => {
            let product = non_empty_string(object, "product").ok_or(ActionError::MissingProduct)?;
            Ok(Action::PaymentLink { product: product.to_string(), amount })
        }
        _ => {
            let account_id = object
                .get("account_id")
                .and_then(Value::as_str)
                .filter(|account_id| account_id.starts_with(ACCOUNT_ID_PREFIX))
                .ok_or(ActionError::InvalidAccountId)?;
            Ok(Action::ConnectPayment { account_id: account_id.to_string(), amount })
        }
    }
}

fn coerce_amount(value: Option<&Value>) -> Result<Amount, ActionError> {
    let amount = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount.ok_or(ActionError::InvalidAmount).and_then(Amount::new)
}

/// Blank values count as missing; accepted values are kept verbatim.
fn non_empty_string<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|value| !value.trim().is_empty())
}
