//! Unique payment codes added to top-up totals for bank-statement matching.

use super::UniqueCodeGenerator;
use crate::domain::{Currency, Money};
use rand::Rng;

/// IDR codes are whole rupiah 1..=999; USD codes are cents 0.01..=0.99.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl UniqueCodeGenerator for RandomCodes {
    fn next_code(&self, currency: Currency) -> Money {
        let mut rng = rand::rng();
        match currency {
            Currency::Idr => Money::from_units(rng.random_range(1..=999)),
            Currency::Usd => Money::from_storage(rng.random_range(1..=99)),
        }
    }
}

/// Always returns the same code.
#[derive(Debug, Clone, Copy)]
pub struct FixedCode(pub Money);

impl UniqueCodeGenerator for FixedCode {
    fn next_code(&self, _currency: Currency) -> Money {
        self.0
    }
}
