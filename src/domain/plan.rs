/// A subscription plan offered at checkout: a payment-provider price plus a
/// human-readable label for emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub price_id: String,
    pub label: String,
}

impl Plan {
    pub fn new(
        price_id: &str,
        label: &str,
    ) -> Self {
        Self {
            price_id: price_id.to_string(),
            label: label.to_string(),
        }
    }
}

/// Locale -> plan selection. USD is the default for every country except
/// Mexico.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    usd: Plan,
    mxn: Plan,
}

impl PlanCatalog {
    pub fn new(
        usd: Plan,
        mxn: Plan,
    ) -> Self {
        Self { usd, mxn }
    }

    pub fn for_country(
        &self,
        country: Option<&str>,
    ) -> &Plan {
        match country {
            Some("MX") => &self.mxn,
            _ => &self.usd,
        }
    }

    /// Label of a known price, if it belongs to this catalog
    pub fn label_for_price(
        &self,
        price_id: &str,
    ) -> Option<&str> {
        [&self.usd, &self.mxn]
            .into_iter()
            .find(|p| p.price_id == price_id)
            .map(|p| p.label.as_str())
    }
}
