use serde::Deserialize;

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";

/// Envelope of every webhook delivery. `data.object` is kept raw until the
/// event type is known.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// unix seconds
    pub created: Option<i64>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn is_subscription_created(&self) -> bool { self.event_type == SUBSCRIPTION_CREATED }

    pub fn subscription(&self) -> Result<SubscriptionObject, serde_json::Error> {
        SubscriptionObject::deserialize(&self.data.object)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: CustomerRef,
    pub status: Option<String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl SubscriptionObject {
    /// The first line item's price; subscriptions here are single-plan
    pub fn price(&self) -> Option<&Price> { self.items.data.first().map(|item| &item.price) }
}

/// `customer` is an id unless the event was delivered with it expanded
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CustomerRef {
    Id(String),
    Expanded(ExpandedCustomer),
}

impl CustomerRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Expanded(c) => &c.id,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Expanded(c) => c.email.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpandedCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub nickname: Option<String>,
}
