//! Shared identifiers and numeric types

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Holder or validator-controller identity
pub type Address = [u8; 32];

/// Validator identifier (foreign key into the validator registry)
pub type ValidatorId = u64;

/// Delegation identifier, assigned monotonically from 0
pub type DelegationId = u64;

/// Token quantity
pub type Amount = u128;

/// Epoch ("month") index
pub type Epoch = u64;

/// Seconds in a day, used by notice windows and lock-up periods
pub const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Short hex form of an address for log lines
pub fn short_address(address: &Address) -> String {
    hex::encode(&address[..4])
}

/// Build an address from a human-readable label (zero padded, truncated to 32 bytes)
pub fn label_address(label: &str) -> Address {
    let mut address = [0u8; 32];
    let bytes = label.as_bytes();
    let len = bytes.len().min(32);
    address[..len].copy_from_slice(&bytes[..len]);
    address
}

/// Non-negative rational number used to scale amounts
///
/// Always stored in lowest terms. The denominator is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    numerator: Amount,
    denominator: Amount,
}

impl Fraction {
    /// Create a fraction, `None` if the denominator is zero
    pub fn new(numerator: Amount, denominator: Amount) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let divisor = gcd(numerator, denominator);
        Some(Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        })
    }

    pub fn one() -> Self {
        Self { numerator: 1, denominator: 1 }
    }

    pub fn zero() -> Self {
        Self { numerator: 0, denominator: 1 }
    }

    pub fn numerator(&self) -> Amount {
        self.numerator
    }

    pub fn denominator(&self) -> Amount {
        self.denominator
    }

    /// True if applying this fraction can never increase an amount
    pub fn is_at_most_one(&self) -> bool {
        self.numerator <= self.denominator
    }

    /// floor(amount * numerator / denominator)
    pub fn apply(&self, amount: Amount) -> Amount {
        mul_div(amount, self.numerator, self.denominator)
    }
}

fn gcd(mut a: Amount, mut b: Amount) -> Amount {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    // gcd(0, 0) only happens with a zero denominator, which `new` rejects
    a.max(1)
}

/// floor(a * b / c) without intermediate overflow, saturating on an
/// out-of-range result. `c` must be non-zero.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Amount {
    if let Some(product) = a.checked_mul(b) {
        return product / c;
    }
    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(c);
    u128::try_from(wide).unwrap_or(Amount::MAX)
}
