//! Paid access: x402 micropayments, the payment gate and access debits

pub mod client;
pub mod gate;
pub mod requirements;

pub use client::{
    decode_payment_header, MicropaymentClient, PaymentError, SettleResponse, VerifiedPayment,
    X_PAYMENT, X_PAYMENT_RESPONSE,
};
pub use gate::{charge, payment_required, require_payment, Charge, PaidAccess};
pub use requirements::{PaymentInstructions, PaymentRequirements, X402_VERSION};
