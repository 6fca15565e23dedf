use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    /// Present fields as `(name, value)` pairs in a stable order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("line1", &self.line1),
            ("line2", &self.line2),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
        .collect()
    }
}

/// Caller-supplied payment provider customer, possibly partial.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An existing customer together with a payment method attached to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentSource<'a> {
    pub customer_id: &'a str,
    pub payment_method_id: &'a str,
}

impl CustomerInfo {
    pub fn payment_source(&self) -> Option<PaymentSource<'_>> {
        let customer_id = self.id.as_deref().filter(|id| !id.trim().is_empty())?;
        let payment_method_id =
            self.payment_method_id.as_deref().filter(|id| !id.trim().is_empty())?;
        Some(PaymentSource { customer_id, payment_method_id })
    }

    pub fn has_contact_details(&self) -> bool {
        self.name.is_some() || self.email.is_some() || self.phone.is_some() || self.address.is_some()
    }

    pub fn missing_recommended_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.is_none() {
            missing.push("id");
        }
        if self.payment_method_id.is_none() {
            missing.push("payment_method_id");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        missing
    }
}
