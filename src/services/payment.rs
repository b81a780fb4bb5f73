use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Booking, Package};

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount: f64,
    pub instructions: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initiate_deposit(
        &self,
        booking: &Booking,
        package: &Package,
    ) -> anyhow::Result<PaymentRequest>;
}

pub struct BankTransferPayments {
    instructions: String,
}

impl BankTransferPayments {
    pub fn new(instructions: String) -> Self {
        Self { instructions }
    }
}

pub fn deposit_reference(booking_id: &str) -> String {
    let short: String = booking_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!("DEP-{}", short.to_uppercase())
}

#[async_trait]
impl PaymentProvider for BankTransferPayments {
    async fn initiate_deposit(
        &self,
        booking: &Booking,
        package: &Package,
    ) -> anyhow::Result<PaymentRequest> {
        let reference = deposit_reference(&booking.id);
        tracing::info!(booking = %booking.id, reference = %reference, amount = package.deposit, "deposit requested");
        Ok(PaymentRequest {
            instructions: format!(
                "Deposit due: {:.0}. Use reference {reference}. {}",
                package.deposit, self.instructions
            ),
            reference,
            amount: package.deposit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_short_and_stable() {
        assert_eq!(
            deposit_reference("3f2a9c1e-77aa-4c1b-9f00-000000000000"),
            "DEP-3F2A9C1E"
        );
    }
}
